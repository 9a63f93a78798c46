//! Contract stress vectors: deployment with deferred confirmation,
//! invocation patterns, the self-destruct lifecycle, conflicting calls,
//! and the resource-pressure family.

use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;
use tracing::{debug, warn};

use squall_chain_client::cbor::CreateExternalReturn;
use squall_chain_client::{Address, Message, TipSetKey, TokenAmount};
use squall_harness::{always, sometimes};

use crate::context::{DeployedContract, EngineContext, PendingDeploy};
use crate::evm::{abi, contracts, deploy_contract, estimate_or_fallback, invoke_contract};
use crate::pipeline::{cid_short, sign_message, METHOD_INVOKE_CONTRACT};

const MAX_PENDING_DEPLOYS: usize = 50;
/// Receipt search window when draining the pending-deploy queue.
const RECEIPT_LOOKBACK: i64 = 100;
/// Bound on synchronous receipt waits so the main loop cannot stall.
const STATE_WAIT_TIMEOUT: Duration = Duration::from_secs(120);
const STATE_WAIT_CONFIDENCE: u64 = 1;
const STATE_WAIT_LOOKBACK: i64 = 200;

/// Drains the pending queue, then submits one new deployment of a random
/// contract type. Deployments never block the loop; confirmation happens on
/// a later pass.
pub async fn deploy_contracts(ctx: &EngineContext) {
    resolve_pending_deploys(ctx).await;

    let ctype = *ctx.rng.choice(contracts::DEPLOYABLE_TYPES);
    let Some(bytecode) = contracts::bytecode(ctype) else {
        return;
    };
    let wallet = ctx.pick_wallet();
    let node = ctx.pick_node();

    let tag = format!("deploy-{ctype}");
    let Some(message_cid) = deploy_contract(ctx, node, wallet, &bytecode, &tag).await else {
        warn!(target: "engine::deploy", ctype, node = %node.name, "deploy submission failed");
        return;
    };

    let epoch = match node.client.chain_head().await {
        Ok(head) => head.height,
        Err(_) => 0,
    };

    {
        let mut pending = ctx.pending_deploys.lock();
        if pending.len() < MAX_PENDING_DEPLOYS {
            pending.push(PendingDeploy {
                message: message_cid.clone(),
                ctype,
                deployer: wallet.address.clone(),
                epoch,
            });
        }
    }

    debug!(target: "engine::deploy", ctype, node = %node.name, cid = cid_short(&message_cid), "submitted");
    sometimes(
        true,
        "contract deploy submitted",
        json!({ "type": ctype, "node": node.name }),
    );
}

/// Polls receipts for queued deployments. Confirmed entries join the
/// contract registry; unresolved ones are put back for the next pass.
async fn resolve_pending_deploys(ctx: &EngineContext) {
    let pending: Vec<PendingDeploy> = std::mem::take(&mut *ctx.pending_deploys.lock());
    if pending.is_empty() {
        return;
    }
    let node = ctx.pool.primary();

    let mut unresolved = Vec::new();
    for deploy in pending {
        let lookup = match node
            .client
            .state_search_msg(&TipSetKey::empty(), &deploy.message, RECEIPT_LOOKBACK, true)
            .await
        {
            Ok(Some(lookup)) => lookup,
            _ => {
                unresolved.push(deploy);
                continue;
            }
        };

        if !lookup.receipt.is_success() {
            warn!(
                target: "engine::deploy",
                ctype = deploy.ctype,
                exit_code = lookup.receipt.exit_code,
                "deployment failed"
            );
            continue;
        }

        let decoded = match CreateExternalReturn::decode(&lookup.receipt.return_bytes()) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(target: "engine::deploy", ctype = deploy.ctype, %err, "return decode failed");
                continue;
            }
        };
        let address = Address::new_id(decoded.actor_id);
        debug!(
            target: "engine::deploy",
            ctype = deploy.ctype,
            contract = %address,
            actor_id = decoded.actor_id,
            "confirmed"
        );
        ctx.register_contract(DeployedContract {
            address,
            ctype: deploy.ctype,
            deployer: deploy.deployer.clone(),
        });
        sometimes(
            true,
            "contract deployed",
            json!({ "type": deploy.ctype, "actor_id": decoded.actor_id }),
        );
    }

    if !unresolved.is_empty() {
        let mut pending = ctx.pending_deploys.lock();
        unresolved.append(&mut pending);
        *pending = unresolved;
    }
}

/// Invokes a random deployed contract with one of four call patterns.
pub async fn contract_call(ctx: &EngineContext) {
    if ctx.contracts.lock().is_empty() {
        debug!(target: "engine::contract-call", "skip: no deployed contracts yet");
        return;
    }
    match ctx.rng.next_int(4) {
        0 => deep_recursion(ctx).await,
        1 => delegatecall_recursion(ctx).await,
        2 => token_transfer(ctx).await,
        _ => external_recursion(ctx).await,
    }
}

async fn call_typed_contract(
    ctx: &EngineContext,
    ctype: &str,
    signature: &str,
    words: Vec<[u8; 32]>,
    tag: &str,
) -> bool {
    let candidates = ctx.contracts_of_type(ctype);
    if candidates.is_empty() {
        return false;
    }
    let contract = ctx.rng.choice(&candidates);
    let Some(deployer) = ctx.wallet_by_address(&contract.deployer) else {
        return false;
    };
    let node = ctx.pick_node();

    let calldata = abi::wrap_calldata(&abi::calldata(abi::selector(signature), &words));
    invoke_contract(ctx, node, deployer, &contract.address, calldata, tag)
        .await
        .is_some()
}

async fn deep_recursion(ctx: &EngineContext) {
    let depth = ctx.rng.next_int(100) as u64 + 1;
    let ok = call_typed_contract(
        ctx,
        "recursive",
        "recursiveCall(uint256)",
        vec![abi::encode_u64(depth)],
        "recursive-call",
    )
    .await;
    sometimes(
        ok,
        "contract call submitted",
        json!({ "type": "recursive", "depth": depth }),
    );
}

async fn delegatecall_recursion(ctx: &EngineContext) {
    // Delegatecall recursion burns more gas per level; keep the depth lower.
    let depth = ctx.rng.next_int(50) as u64 + 1;
    let ok = call_typed_contract(
        ctx,
        "delegatecall",
        "recursiveCall(uint256)",
        vec![abi::encode_u64(depth)],
        "delegatecall-call",
    )
    .await;
    sometimes(
        ok,
        "delegatecall submitted",
        json!({ "type": "delegatecall", "depth": depth }),
    );
}

async fn token_transfer(ctx: &EngineContext) {
    let recipient = ctx.pick_wallet();
    let amount = ctx.rng.next_int(100) as u64 + 1;
    let ok = call_typed_contract(
        ctx,
        "simplecoin",
        "sendCoin(address,uint256)",
        vec![
            abi::encode_address(recipient.address.payload()),
            abi::encode_u64(amount),
        ],
        "simplecoin-send",
    )
    .await;
    sometimes(ok, "token transfer submitted", json!({ "amount": amount }));
}

async fn external_recursion(ctx: &EngineContext) {
    let depth = ctx.rng.next_int(30) as u64 + 1;
    let ok = call_typed_contract(
        ctx,
        "extrecursive",
        "exec1(uint256)",
        vec![abi::encode_u64(depth)],
        "ext-recursive-call",
    )
    .await;
    sometimes(
        ok,
        "external recursion submitted",
        json!({ "type": "extrecursive", "depth": depth }),
    );
}

/// Deploys a self-destruct contract, destroys it, and verifies every node
/// agrees on the actor's post-destruct state. The address stays registered
/// as a probe target.
pub async fn selfdestruct_cycle(ctx: &EngineContext) {
    let wallet = ctx.pick_wallet();
    let node = ctx.pick_node();

    let Some(bytecode) = contracts::bytecode("selfdestruct") else {
        return;
    };
    let Some(deploy_cid) = deploy_contract(ctx, node, wallet, &bytecode, "selfdestruct-deploy").await
    else {
        return;
    };

    let lookup = match timeout(
        STATE_WAIT_TIMEOUT,
        node.client
            .state_wait_msg(&deploy_cid, STATE_WAIT_CONFIDENCE, STATE_WAIT_LOOKBACK, false),
    )
    .await
    {
        Ok(Ok(lookup)) => lookup,
        Ok(Err(err)) => {
            warn!(target: "engine::selfdestruct", %err, "deploy wait failed");
            return;
        }
        Err(_) => {
            warn!(target: "engine::selfdestruct", "deploy wait timed out");
            return;
        }
    };
    if !lookup.receipt.is_success() {
        warn!(
            target: "engine::selfdestruct",
            exit_code = lookup.receipt.exit_code,
            "deploy failed"
        );
        return;
    }

    let decoded = match CreateExternalReturn::decode(&lookup.receipt.return_bytes()) {
        Ok(decoded) => decoded,
        Err(err) => {
            warn!(target: "engine::selfdestruct", %err, "return decode failed");
            return;
        }
    };
    let contract_addr = Address::new_id(decoded.actor_id);
    debug!(target: "engine::selfdestruct", contract = %contract_addr, "deployed, destroying");

    let calldata = abi::wrap_calldata(&abi::calldata(abi::selector("destroy()"), &[]));
    let Some(destroy_cid) =
        invoke_contract(ctx, node, wallet, &contract_addr, calldata, "selfdestruct-destroy").await
    else {
        return;
    };

    let destroy_lookup = match timeout(
        STATE_WAIT_TIMEOUT,
        node.client
            .state_wait_msg(&destroy_cid, STATE_WAIT_CONFIDENCE, STATE_WAIT_LOOKBACK, false),
    )
    .await
    {
        Ok(Ok(lookup)) => lookup,
        Ok(Err(err)) => {
            warn!(target: "engine::selfdestruct", %err, "destroy wait failed");
            return;
        }
        Err(_) => {
            warn!(target: "engine::selfdestruct", "destroy wait timed out");
            return;
        }
    };

    let destroyed = destroy_lookup.receipt.is_success();
    sometimes(
        destroyed,
        "selfdestruct executed",
        json!({ "contract": contract_addr.to_string(), "node": node.name }),
    );
    if !destroyed {
        warn!(
            target: "engine::selfdestruct",
            exit_code = destroy_lookup.receipt.exit_code,
            "destroy failed"
        );
        return;
    }

    ctx.register_contract(DeployedContract {
        address: contract_addr.clone(),
        ctype: "selfdestruct",
        deployer: wallet.address.clone(),
    });

    // Verify cross-node agreement anchored at the destroy receipt's tipset,
    // not the live head; other nodes may not have synced the head yet.
    if ctx.pool.len() >= 2 {
        let anchor = destroy_lookup.tipset.clone();
        let mut results = Vec::new();
        let mut responding = Vec::new();
        for handle in ctx.pool.handles() {
            match handle
                .client
                .state_get_actor(&contract_addr.to_string(), &anchor)
                .await
            {
                Ok(Some(actor)) => {
                    results.push(format!("{}:{}", handle.name, actor.code.root));
                    responding.push(actor.code.root);
                }
                Ok(None) => {
                    results.push(format!("{}:nil", handle.name));
                    responding.push("nil".to_string());
                }
                Err(err) => {
                    warn!(target: "engine::selfdestruct", node = %handle.name, %err, "actor query failed");
                    results.push(format!("{}:error", handle.name));
                }
            }
        }

        // RPC errors are connectivity issues; only responding nodes count
        // toward the divergence check.
        let all_same = responding.windows(2).all(|pair| pair[0] == pair[1]);
        always(
            all_same,
            "post-destruct actor state agrees across nodes",
            json!({ "contract": contract_addr.to_string(), "results": results }),
        );
        if !all_same {
            warn!(target: "engine::selfdestruct", ?results, "STATE DIVERGENCE after destroy");
        }
    }
}

/// Conflicting token sends under one nonce to two nodes. The amount is
/// chosen so both cannot both succeed on-chain.
pub async fn contract_race(ctx: &EngineContext) {
    if ctx.pool.len() < 2 {
        return;
    }
    let candidates = ctx.contracts_of_type("simplecoin");
    if candidates.is_empty() {
        return;
    }
    let contract = ctx.rng.choice(&candidates);
    let Some(deployer) = ctx.wallet_by_address(&contract.deployer) else {
        return;
    };

    let to_a = ctx.pick_wallet();
    let to_b = ctx.pick_wallet();
    if to_a.address == to_b.address {
        return;
    }

    let first = ctx.rng.next_int(ctx.pool.len());
    let mut second = ctx.rng.next_int(ctx.pool.len());
    while second == first && ctx.pool.len() > 1 {
        second = ctx.rng.next_int(ctx.pool.len());
    }
    let node_a = ctx.pool.get(first);
    let node_b = ctx.pool.get(second);

    let nonce = ctx.current_nonce(&contract.deployer);
    // Most of the token supply, so the second transfer must conflict.
    let amount = 8_000u64;

    let build = |to: &Address| -> Message {
        let calldata = abi::wrap_calldata(&abi::calldata(
            abi::selector("sendCoin(address,uint256)"),
            &[abi::encode_address(to.payload()), abi::encode_u64(amount)],
        ));
        let mut message = crate::pipeline::base_message(
            &contract.deployer,
            &contract.address,
            TokenAmount::zero(),
        );
        message.method = METHOD_INVOKE_CONTRACT;
        message.params = calldata;
        message.nonce = nonce;
        message
    };

    let mut msg_a = build(&to_a.address);
    let mut msg_b = build(&to_b.address);
    estimate_or_fallback(node_a, &mut msg_a).await;
    estimate_or_fallback(node_b, &mut msg_b).await;
    // Estimation sees the live nonce; restamp the raced one.
    msg_a.nonce = nonce;
    msg_b.nonce = nonce;

    let (Some(signed_a), Some(signed_b)) = (
        sign_message(&msg_a, &deployer.key),
        sign_message(&msg_b, &deployer.key),
    ) else {
        return;
    };

    let (result_a, result_b) = tokio::join!(
        node_a.client.mpool_push(&signed_a),
        node_b.client.mpool_push(&signed_b),
    );

    ctx.bump_nonce(&contract.deployer);

    debug!(
        target: "engine::contract-race",
        node_a = %node_a.name,
        ok_a = result_a.is_ok(),
        node_b = %node_b.name,
        ok_b = result_b.is_ok(),
        "conflicting sends"
    );
    sometimes(
        result_a.is_ok() || result_b.is_ok(),
        "conflicting contract call accepted",
        json!({
            "contract": contract.address.to_string(),
            "nonce": nonce,
            "node_a": node_a.name,
            "node_b": node_b.name,
        }),
    );
}

/// Deploys a resource-stress contract when none of the type exists yet.
async fn deploy_resource_contract(ctx: &EngineContext, ctype: &'static str) {
    let Some(bytecode) = contracts::bytecode(ctype) else {
        return;
    };
    let wallet = ctx.pick_wallet();
    let node = ctx.pick_node();

    let tag = format!("deploy-{ctype}");
    let Some(message_cid) = deploy_contract(ctx, node, wallet, &bytecode, &tag).await else {
        return;
    };
    let epoch = node.client.chain_head().await.map(|h| h.height).unwrap_or(0);
    let mut pending = ctx.pending_deploys.lock();
    if pending.len() < MAX_PENDING_DEPLOYS {
        pending.push(PendingDeploy {
            message: message_cid,
            ctype,
            deployer: wallet.address.clone(),
            epoch,
        });
    }
}

async fn invoke_resource_contract(
    ctx: &EngineContext,
    ctype: &'static str,
    signature: &str,
    words: Vec<[u8; 32]>,
    tag: &str,
) -> bool {
    let candidates = ctx.contracts_of_type(ctype);
    if candidates.is_empty() {
        deploy_resource_contract(ctx, ctype).await;
        return false;
    }
    let contract = ctx.rng.choice(&candidates);
    let Some(deployer) = ctx.wallet_by_address(&contract.deployer) else {
        return false;
    };
    let node = ctx.pick_node();
    let calldata = abi::wrap_calldata(&abi::calldata(abi::selector(signature), &words));
    invoke_contract(ctx, node, deployer, &contract.address, calldata, tag)
        .await
        .is_some()
}

/// Tight hash loop maxing out block gas.
pub async fn gas_guzzler(ctx: &EngineContext) {
    let iterations = ctx.rng.next_int(9_500) as u64 + 500;
    let ok = invoke_resource_contract(
        ctx,
        "gasguzzler",
        "burnGas(uint256)",
        vec![abi::encode_u64(iterations)],
        "gas-guzzler",
    )
    .await;
    sometimes(ok, "gas guzzler submitted", json!({ "iterations": iterations }));
}

/// Event storm stressing receipt storage and bloom computation.
pub async fn log_blaster(ctx: &EngineContext) {
    let count = ctx.rng.next_int(450) as u64 + 50;
    let ok = invoke_resource_contract(
        ctx,
        "logblaster",
        "blastLogs(uint256)",
        vec![abi::encode_u64(count)],
        "log-blaster",
    )
    .await;
    sometimes(ok, "log blaster submitted", json!({ "count": count }));
}

/// Quadratic-cost memory expansion.
pub async fn memory_bomb(ctx: &EngineContext) {
    let words = ctx.rng.next_int(4_900) as u64 + 100;
    let ok = invoke_resource_contract(
        ctx,
        "memorybomb",
        "expandMemory(uint256)",
        vec![abi::encode_u64(words)],
        "memory-bomb",
    )
    .await;
    sometimes(ok, "memory bomb submitted", json!({ "words": words }));
}

/// Unique-slot writes growing the state trie.
pub async fn storage_spam(ctx: &EngineContext) {
    let count = ctx.rng.next_int(190) as u64 + 10;
    let seed = ctx.rng.next_u64();
    let ok = invoke_resource_contract(
        ctx,
        "storagespam",
        "spamSlots(uint256,uint256)",
        vec![abi::encode_u64(count), abi::encode_u64(seed)],
        "storage-spam",
    )
    .await;
    sometimes(ok, "storage spam submitted", json!({ "count": count }));
}
