//! Mempool-facing vectors: plain transfers, replacement wars, and the
//! adversarial sub-actions (double spend, invalid signature, nonce race).

use serde_json::json;
use tracing::{debug, warn};

use squall_chain_client::{
    NodeHandle, SignatureJson, SignedMessageJson, TokenAmount, SIG_TYPE_SECP256K1,
};
use squall_harness::{always, sometimes};

use crate::context::EngineContext;
use crate::pipeline::{base_message, push_message, sign_message};

/// Sends a small random amount between two distinct wallets via a random
/// node.
pub async fn transfer_market(ctx: &EngineContext) {
    let from = ctx.pick_wallet();
    let to = ctx.pick_wallet();
    if from.address == to.address {
        return;
    }

    // 1-100 of the smallest unit, tiny enough to never drain a wallet.
    let amount = TokenAmount(ctx.rng.next_int(100) as u128 + 1);
    let node = ctx.pick_node();
    let mut message = base_message(&from.address, &to.address, amount);

    let pushed = push_message(ctx, node, &mut message, &from.key, "transfer")
        .await
        .is_some();
    if pushed {
        debug!(target: "engine::transfer", from = %from.address, to = %to.address, node = %node.name, "ok");
    }

    sometimes(
        pushed,
        "transfer message pushed",
        json!({
            "from": from.address.to_string(),
            "to": to.address.to_string(),
            "amount": amount.to_string(),
            "node": node.name,
        }),
    );
}

/// Mempool replacement: a low-premium transaction followed by a 500×
/// premium replacement under the same nonce, both to the same node.
pub async fn gas_war(ctx: &EngineContext) {
    let from = ctx.pick_wallet();
    let to_a = ctx.pick_wallet();
    let to_b = ctx.pick_wallet();
    if from.address == to_a.address || from.address == to_b.address {
        return;
    }

    let node = ctx.pick_node();
    let nonce = ctx.current_nonce(&from.address);

    let mut low = base_message(&from.address, &to_a.address, TokenAmount(1));
    low.nonce = nonce;
    low.gas_premium = TokenAmount(100);
    low.gas_fee_cap = TokenAmount(100_000);
    let Some(signed_low) = sign_message(&low, &from.key) else {
        return;
    };

    if let Err(err) = node.client.mpool_push(&signed_low).await {
        warn!(target: "engine::gas-war", %err, "low-premium push failed");
        return;
    }

    let mut high = base_message(&from.address, &to_b.address, TokenAmount(1));
    high.nonce = nonce;
    high.gas_premium = TokenAmount(50_000);
    high.gas_fee_cap = TokenAmount(200_000);
    let Some(signed_high) = sign_message(&high, &from.key) else {
        // The low-premium push consumed the nonce.
        ctx.bump_nonce(&from.address);
        return;
    };

    let replacement = node.client.mpool_push(&signed_high).await;

    // The nonce is consumed whether or not the replacement was accepted.
    ctx.bump_nonce(&from.address);

    sometimes(
        true,
        "gas war low premium accepted",
        json!({ "node": node.name, "nonce": nonce }),
    );
    sometimes(
        replacement.is_ok(),
        "gas war replacement accepted",
        json!({
            "node": node.name,
            "nonce": nonce,
            "low_premium": "100",
            "high_premium": "50000",
        }),
    );

    debug!(
        target: "engine::gas-war",
        nonce,
        replacement_ok = replacement.is_ok(),
        "done"
    );
}

/// Picks one of the three adversarial sub-actions at random.
pub async fn adversarial(ctx: &EngineContext) {
    match ctx.rng.next_int(3) {
        0 => double_spend(ctx).await,
        1 => invalid_signature(ctx).await,
        _ => nonce_race(ctx).await,
    }
}

fn pick_two_nodes<'a>(ctx: &'a EngineContext) -> (&'a NodeHandle, &'a NodeHandle) {
    let first = ctx.rng.next_int(ctx.pool.len());
    let mut second = ctx.rng.next_int(ctx.pool.len());
    while second == first && ctx.pool.len() > 1 {
        second = ctx.rng.next_int(ctx.pool.len());
    }
    (ctx.pool.get(first), ctx.pool.get(second))
}

/// Conflicting transfers under one nonce, pushed concurrently to two
/// different nodes. At most one may land on-chain; the consistency audit
/// owns that assertion. Here: at least one mempool accepted it.
async fn double_spend(ctx: &EngineContext) {
    if ctx.pool.len() < 2 {
        return;
    }

    let from = ctx.pick_wallet();
    let to_a = ctx.pick_wallet();
    let to_b = ctx.pick_wallet();
    if from.address == to_a.address
        || from.address == to_b.address
        || to_a.address == to_b.address
    {
        return;
    }

    let (node_a, node_b) = pick_two_nodes(ctx);
    let nonce = ctx.current_nonce(&from.address);

    let mut msg_a = base_message(&from.address, &to_a.address, TokenAmount(1));
    msg_a.nonce = nonce;
    let mut msg_b = base_message(&from.address, &to_b.address, TokenAmount(1));
    msg_b.nonce = nonce;

    let (Some(signed_a), Some(signed_b)) =
        (sign_message(&msg_a, &from.key), sign_message(&msg_b, &from.key))
    else {
        return;
    };

    let (result_a, result_b) = tokio::join!(
        node_a.client.mpool_push(&signed_a),
        node_b.client.mpool_push(&signed_b),
    );

    // One nonce consumed regardless of which submission won.
    ctx.bump_nonce(&from.address);

    debug!(
        target: "engine::adversarial",
        node_a = %node_a.name,
        ok_a = result_a.is_ok(),
        node_b = %node_b.name,
        ok_b = result_b.is_ok(),
        "double spend"
    );

    sometimes(
        result_a.is_ok() || result_b.is_ok(),
        "double spend at least one accepted",
        json!({
            "from": from.address.to_string(),
            "nonce": nonce,
            "node_a": node_a.name,
            "node_b": node_b.name,
        }),
    );
}

/// A message with garbage signature bytes over a valid nonce. The mempool
/// must refuse it, and the nonce is not consumed.
async fn invalid_signature(ctx: &EngineContext) {
    let from = ctx.pick_wallet();
    let to = ctx.pick_wallet();
    if from.address == to.address {
        return;
    }

    let node = ctx.pick_node();
    let mut message = base_message(&from.address, &to.address, TokenAmount(1));
    message.nonce = ctx.current_nonce(&from.address);

    let garbage = ctx.rng.fill_bytes(65);
    let signed = SignedMessageJson {
        message: (&message).into(),
        signature: SignatureJson::new(SIG_TYPE_SECP256K1, &garbage),
    };

    let rejected = node.client.mpool_push(&signed).await.is_err();

    always(
        rejected,
        "invalid signature rejected",
        json!({
            "node": node.name,
            "from": from.address.to_string(),
            "rejected": rejected,
        }),
    );

    if !rejected {
        warn!(
            target: "engine::adversarial",
            node = %node.name,
            "SAFETY VIOLATION: invalid signature accepted"
        );
    }
}

/// Same nonce, different premiums, different nodes; block packing should
/// prefer the higher premium.
async fn nonce_race(ctx: &EngineContext) {
    if ctx.pool.len() < 2 {
        return;
    }

    let from = ctx.pick_wallet();
    let to = ctx.pick_wallet();
    if from.address == to.address {
        return;
    }

    let (node_a, node_b) = pick_two_nodes(ctx);
    let nonce = ctx.current_nonce(&from.address);

    let mut low = base_message(&from.address, &to.address, TokenAmount(1));
    low.nonce = nonce;
    low.gas_premium = TokenAmount(500);

    let mut high = base_message(&from.address, &to.address, TokenAmount(2));
    high.nonce = nonce;
    high.gas_premium = TokenAmount(100_000);
    high.gas_fee_cap = TokenAmount(200_000);

    let (Some(signed_low), Some(signed_high)) =
        (sign_message(&low, &from.key), sign_message(&high, &from.key))
    else {
        return;
    };

    let (result_low, result_high) = tokio::join!(
        node_a.client.mpool_push(&signed_low),
        node_b.client.mpool_push(&signed_high),
    );

    ctx.bump_nonce(&from.address);

    sometimes(
        result_low.is_ok() || result_high.is_ok(),
        "nonce race at least one accepted",
        json!({
            "from": from.address.to_string(),
            "nonce": nonce,
            "node_lo": node_a.name,
            "node_hi": node_b.name,
        }),
    );
}
