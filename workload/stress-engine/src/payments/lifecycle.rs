//! Active payment-layer vectors: token transfers, deposits, operator
//! approval, rail creation and settlement, withdrawal. All transactions go
//! through the delegated EIP-1559 path.

use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, warn};

use squall_harness::{always, sometimes};

use crate::context::EngineContext;
use crate::evm::abi;
use crate::evm::send_eth_tx;
use crate::evm::uint256::U256Word;

use super::{eth_call_raw, read_account_funds, PaymentsProfile};

/// One whole token in its smallest denomination.
const TOKEN_UNIT: u128 = 1_000_000_000_000_000_000;
/// Wait for transaction inclusion before re-reading contract state.
const TX_WAIT: Duration = Duration::from_secs(15);

/// Transfers 1–5 tokens from the client wallet to the deployer wallet.
pub async fn transfer_token(ctx: &EngineContext) {
    let Some(profile) = ctx.payments.as_ref() else {
        return;
    };
    let (Some(client_key), Some(token), Some(deployer)) = (
        profile.client_key.as_deref(),
        profile.token_addr,
        profile.deployer_eth,
    ) else {
        return;
    };
    let node = ctx.pick_node();

    let amount = (ctx.rng.next_int(5) as u128 + 1) * TOKEN_UNIT;
    let calldata = abi::calldata(
        abi::selector("transfer(address,uint256)"),
        &[abi::encode_address(&deployer), abi::encode_u128(amount)],
    );
    let ok = send_eth_tx(ctx, node, client_key, &token, calldata, "pay-transfer").await;

    sometimes(
        ok,
        "token transfer between wallets submitted",
        json!({ "amount": amount.to_string() }),
    );
}

/// Approves the payment contract as a spender, deposits 1–10 tokens, and
/// asserts the account-funds view grew by exactly the deposited amount.
pub async fn deposit(ctx: &EngineContext) {
    let Some(profile) = ctx.payments.as_ref() else {
        return;
    };
    let (Some(client_key), Some(client_eth), Some(token)) = (
        profile.client_key.as_deref(),
        profile.client_eth,
        profile.token_addr,
    ) else {
        return;
    };
    let node = ctx.pick_node();
    let pay = profile.pay_addr;

    let amount = (ctx.rng.next_int(10) as u128 + 1) * TOKEN_UNIT;
    let funds_before = read_account_funds(node, &pay, &token, &client_eth).await;
    debug!(target: "engine::payments", amount, funds_before = %funds_before, "deposit start");

    let approve = abi::calldata(
        abi::selector("approve(address,uint256)"),
        &[abi::encode_address(&pay), abi::encode_u128(amount)],
    );
    if !send_eth_tx(ctx, node, client_key, &token, approve, "pay-approve").await {
        return;
    }

    let deposit = abi::calldata(
        abi::selector("deposit(address,address,uint256)"),
        &[
            abi::encode_address(&token),
            abi::encode_address(&client_eth),
            abi::encode_u128(amount),
        ],
    );
    if !send_eth_tx(ctx, node, client_key, &pay, deposit, "pay-deposit").await {
        return;
    }

    sleep(TX_WAIT).await;

    let funds_after = read_account_funds(node, &pay, &token, &client_eth).await;
    let increased = funds_after.checked_sub(funds_before);
    let exact = increased == Some(U256Word::from_u128(amount));

    always(
        exact,
        "deposit increases the payment account by exactly the deposited amount",
        json!({
            "amount": amount.to_string(),
            "funds_before": funds_before.to_string(),
            "funds_after": funds_after.to_string(),
        }),
    );
}

/// Grants the storage-service contract operator rights on the client's
/// payment account.
pub async fn approve_operator(ctx: &EngineContext) {
    let Some(profile) = ctx.payments.as_ref() else {
        return;
    };
    let (Some(client_key), Some(token), Some(service)) = (
        profile.client_key.as_deref(),
        profile.token_addr,
        profile.service_addr,
    ) else {
        return;
    };
    let node = ctx.pick_node();

    // rate 1,000 tokens/epoch, lockup 10,000 tokens, max lockup 2,880 epochs.
    let rate_allowance = 1_000 * TOKEN_UNIT;
    let lockup_allowance = 10_000 * TOKEN_UNIT;
    let max_lockup_period = 2_880u64;

    let calldata = abi::calldata(
        abi::selector("setOperatorApproval(address,address,bool,uint256,uint256,uint256)"),
        &[
            abi::encode_address(&token),
            abi::encode_address(&service),
            abi::encode_bool(true),
            abi::encode_u128(rate_allowance),
            abi::encode_u128(lockup_allowance),
            abi::encode_u64(max_lockup_period),
        ],
    );
    let ok = send_eth_tx(ctx, node, client_key, &profile.pay_addr, calldata, "pay-approve-operator")
        .await;

    sometimes(
        ok,
        "operator approval set on the payment contract",
        json!({
            "rate_allowance": rate_allowance.to_string(),
            "lockup_allowance": lockup_allowance.to_string(),
        }),
    );
}

/// Creates a direct client → deployer payment rail, then caches its id.
pub async fn create_rail(ctx: &EngineContext) {
    let Some(profile) = ctx.payments.as_ref() else {
        return;
    };
    let (Some(client_key), Some(client_eth), Some(token), Some(deployer)) = (
        profile.client_key.as_deref(),
        profile.client_eth,
        profile.token_addr,
        profile.deployer_eth,
    ) else {
        return;
    };
    let node = ctx.pick_node();

    let calldata = abi::calldata(
        abi::selector("createRail(address,address,address,address,uint256,address)"),
        &[
            abi::encode_address(&token),
            abi::encode_address(&client_eth),
            abi::encode_address(&deployer),
            abi::encode_address(&[]),
            abi::encode_u64(0),
            abi::encode_address(&[]),
        ],
    );
    let ok = send_eth_tx(ctx, node, client_key, &profile.pay_addr, calldata, "pay-create-rail")
        .await;

    sometimes(
        ok,
        "payment rail created from client to deployer",
        json!({ "from": hex::encode(client_eth), "to": hex::encode(deployer) }),
    );
    if !ok {
        return;
    }

    sleep(TX_WAIT).await;
    if let Some(rail_id) = discover_rail(ctx, profile).await {
        *profile.active_rail.lock() = Some(rail_id);
        debug!(target: "engine::payments", rail_id, "cached active rail");
    }
}

/// Sets a 1 token/epoch rate on the active rail so settlements move funds.
pub async fn modify_rail(ctx: &EngineContext) {
    let Some(profile) = ctx.payments.as_ref() else {
        return;
    };
    let Some(client_key) = profile.client_key.as_deref() else {
        return;
    };
    let Some(rail_id) = *profile.active_rail.lock() else {
        return;
    };
    let node = ctx.pick_node();

    let calldata = abi::calldata(
        abi::selector("modifyRailPayment(uint256,uint256,uint256)"),
        &[
            abi::encode_u128(rail_id),
            abi::encode_u128(TOKEN_UNIT),
            abi::encode_u64(0),
        ],
    );
    let ok = send_eth_tx(ctx, node, client_key, &profile.pay_addr, calldata, "pay-modify-rail")
        .await;

    sometimes(
        ok,
        "payment rail rate set",
        json!({ "rail_id": rail_id.to_string(), "rate": TOKEN_UNIT.to_string() }),
    );
}

/// Discovers the client's first rail and settles it up to the current epoch.
pub async fn settle_rail(ctx: &EngineContext) {
    let Some(profile) = ctx.payments.as_ref() else {
        return;
    };
    let Some(client_key) = profile.client_key.as_deref() else {
        return;
    };
    let node = ctx.pick_node();

    let Some(rail_id) = discover_rail(ctx, profile).await else {
        debug!(target: "engine::payments", "no rails found for client");
        return;
    };
    *profile.active_rail.lock() = Some(rail_id);

    let epoch = match node.client.chain_head().await {
        Ok(head) => head.height as u64,
        Err(err) => {
            warn!(target: "engine::payments", %err, "head query failed");
            return;
        }
    };

    let calldata = abi::calldata(
        abi::selector("settleRail(uint256,uint256)"),
        &[abi::encode_u128(rail_id), abi::encode_u64(epoch)],
    );
    let ok = send_eth_tx(ctx, node, client_key, &profile.pay_addr, calldata, "pay-settle").await;

    sometimes(
        ok,
        "payment rail settlement submitted",
        json!({ "rail_id": rail_id.to_string(), "epoch": epoch }),
    );
}

/// Withdraws up to one token of available funds back to the client wallet.
pub async fn withdraw(ctx: &EngineContext) {
    let Some(profile) = ctx.payments.as_ref() else {
        return;
    };
    let (Some(client_key), Some(client_eth), Some(token)) = (
        profile.client_key.as_deref(),
        profile.client_eth,
        profile.token_addr,
    ) else {
        return;
    };
    let node = ctx.pick_node();

    let funds = read_account_funds(node, &profile.pay_addr, &token, &client_eth).await;
    if funds.is_zero() {
        debug!(target: "engine::payments", "no funds available to withdraw");
        return;
    }
    let amount = funds
        .to_u128()
        .map(|f| f.min(TOKEN_UNIT))
        .unwrap_or(TOKEN_UNIT);

    let calldata = abi::calldata(
        abi::selector("withdraw(address,uint256)"),
        &[abi::encode_address(&token), abi::encode_u128(amount)],
    );
    let ok = send_eth_tx(ctx, node, client_key, &profile.pay_addr, calldata, "pay-withdraw").await;

    sometimes(
        ok,
        "payment withdrawal submitted",
        json!({ "amount": amount.to_string(), "available": funds.to_string() }),
    );
}

/// First rail id for `(client, token)` via `getRailsForPayerAndToken`.
/// Return layout: `[tuple_ptr, next_offset, total, array_len, rail…]`;
/// the first rail's id is the word at byte 128.
async fn discover_rail(ctx: &EngineContext, profile: &PaymentsProfile) -> Option<u128> {
    let (Some(client_eth), Some(token)) = (profile.client_eth, profile.token_addr) else {
        return None;
    };
    let node = ctx.pick_node();

    let calldata = abi::calldata(
        abi::selector("getRailsForPayerAndToken(address,address,uint256,uint256)"),
        &[
            abi::encode_address(&client_eth),
            abi::encode_address(&token),
            abi::encode_u64(0),
            abi::encode_u64(1),
        ],
    );
    let raw = match eth_call_raw(node, &profile.pay_addr, &calldata).await {
        Ok(raw) => raw,
        Err(err) => {
            warn!(target: "engine::payments", %err, "rail discovery call failed");
            return None;
        }
    };
    if raw.len() < 96 {
        return None;
    }
    let total = U256Word::from_be_slice(&raw[64..96]);
    if total.is_zero() || raw.len() < 160 {
        return None;
    }
    U256Word::from_be_slice(&raw[128..160]).to_u128()
}
