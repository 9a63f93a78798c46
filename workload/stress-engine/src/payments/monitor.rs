//! Read-only payment invariants, checked on every monitor invocation:
//! token conservation, the uint256 underflow guard, and continued
//! service-provider registration.

use serde_json::json;
use tracing::{debug, warn};

use squall_harness::always;

use crate::context::EngineContext;
use crate::evm::abi;
use crate::evm::uint256::U256Word;

use super::{eth_call_word, PaymentsProfile};

pub async fn run_monitor(ctx: &EngineContext) {
    let Some(profile) = ctx.payments.as_ref() else {
        return;
    };

    if let Some(token) = profile.token_addr {
        check_supply_invariants(ctx, profile, &token).await;
    }
    check_provider_registration(ctx, profile).await;
}

async fn check_supply_invariants(
    ctx: &EngineContext,
    profile: &PaymentsProfile,
    token: &[u8; 20],
) {
    let node = ctx.pick_node();

    let total_supply = match eth_call_word(node, token, &abi::calldata(
        abi::selector("totalSupply()"),
        &[],
    ))
    .await
    {
        Ok(supply) => supply,
        Err(err) => {
            warn!(target: "engine::payments", %err, "totalSupply call failed");
            return;
        }
    };

    let read_balance = |addr: Option<[u8; 20]>| async move {
        let Some(addr) = addr else {
            return U256Word::ZERO;
        };
        let calldata = abi::calldata(
            abi::selector("balanceOf(address)"),
            &[abi::encode_address(&addr)],
        );
        match eth_call_word(node, token, &calldata).await {
            Ok(balance) => balance,
            Err(err) => {
                warn!(target: "engine::payments", %err, "balanceOf call failed");
                U256Word::ZERO
            }
        }
    };

    let client = read_balance(profile.client_eth).await;
    let provider = read_balance(profile.provider_eth).await;
    let deployer = read_balance(profile.deployer_eth).await;
    let pay = read_balance(Some(profile.pay_addr)).await;

    // Conservation: the tracked balances must fit under the total supply.
    // A violation means tokens appeared from nowhere.
    let tracked_sum = client
        .checked_add(provider)
        .and_then(|sum| sum.checked_add(deployer))
        .and_then(|sum| sum.checked_add(pay));
    let conserved = tracked_sum.map(|sum| sum <= total_supply).unwrap_or(false);

    debug!(
        target: "engine::payments",
        supply = %total_supply,
        client = %client,
        provider = %provider,
        deployer = %deployer,
        pay = %pay,
        conserved,
        "supply snapshot"
    );

    always(
        conserved,
        "tracked token balances do not exceed total supply",
        json!({
            "total_supply": total_supply.to_string(),
            "client": client.to_string(),
            "provider": provider.to_string(),
            "deployer": deployer.to_string(),
            "pay_contract": pay.to_string(),
        }),
    );

    // A uint256 underflow wraps to a value far above the supply.
    let no_underflow = client <= total_supply
        && provider <= total_supply
        && deployer <= total_supply
        && pay <= total_supply;
    always(
        no_underflow,
        "no single balance exceeds total supply",
        json!({
            "total_supply": total_supply.to_string(),
            "client": client.to_string(),
            "provider": provider.to_string(),
            "deployer": deployer.to_string(),
            "pay_contract": pay.to_string(),
        }),
    );
}

async fn check_provider_registration(ctx: &EngineContext, profile: &PaymentsProfile) {
    let (Some(provider), Some(registry)) = (profile.provider_eth, profile.registry_addr) else {
        return;
    };
    let node = ctx.pick_node();

    let calldata = abi::calldata(
        abi::selector("addressToProviderId(address)"),
        &[abi::encode_address(&provider)],
    );
    match eth_call_word(node, &registry, &calldata).await {
        Ok(provider_id) => {
            let registered = !provider_id.is_zero();
            always(
                registered,
                "storage provider remains registered",
                json!({
                    "provider_id": provider_id.to_string(),
                    "provider": hex::encode(provider),
                }),
            );
        }
        Err(err) => {
            warn!(target: "engine::payments", %err, "addressToProviderId call failed");
        }
    }
}
