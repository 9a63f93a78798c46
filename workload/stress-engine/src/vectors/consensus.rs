//! Chain consistency auditor: the expensive state-recompute walk plus six
//! cross-node sub-checks. State-sensitive checks anchor on finalized
//! tipsets, never the live head, so in-progress partitions cannot produce
//! false divergence reports. An RPC error aborts a check silently:
//! connectivity failures are not consensus failures.

use std::collections::HashMap;

use futures::future::join_all;
use serde_json::json;
use tracing::{debug, warn};

use squall_harness::{always, sometimes};

use crate::context::EngineContext;

const COMPUTE_MIN_HEIGHT: i64 = 20;
const COMPUTE_START_OFFSET: i64 = 2;
const COMPUTE_END_OFFSET: i64 = 12;
const COMPUTE_TARGET_EPOCHS: usize = 5;

/// Checks are skipped until every finalized tipset is past this height.
const FINALIZED_MIN_HEIGHT: i64 = 5;
/// All heads must be past this epoch before the cross-node checks run.
const BOOTSTRAP_MIN_EPOCH: i64 = 10;
/// Finalized heights further apart than this indicate a sync problem.
const MAX_HEIGHT_SPREAD: i64 = 10;

/// Recomputes state for recent epochs and asserts each computed root equals
/// the stored parent-state root one tipset later. A mismatch is a real
/// determinism bug, never an environmental artifact.
pub async fn heavy_compute(ctx: &EngineContext) {
    let node = ctx.pick_node();

    let head = match node.client.chain_head().await {
        Ok(head) => head,
        Err(err) => {
            warn!(target: "engine::heavy-compute", node = %node.name, %err, "head query failed");
            return;
        }
    };
    if head.height < COMPUTE_MIN_HEIGHT {
        return;
    }

    let start_height = head.height - COMPUTE_START_OFFSET;
    let end_height = head.height - COMPUTE_END_OFFSET;

    let mut check_ts = match node
        .client
        .chain_get_tip_set_by_height(start_height, &head.key())
        .await
    {
        Ok(ts) => ts,
        Err(err) => {
            warn!(target: "engine::heavy-compute", height = start_height, %err, "tipset fetch failed");
            return;
        }
    };

    let mut epochs_checked = 0usize;
    while epochs_checked < COMPUTE_TARGET_EPOCHS && check_ts.height >= end_height {
        let parent_key = check_ts.parents();
        let parent_ts = match node.client.chain_get_tip_set(&parent_key).await {
            Ok(ts) => ts,
            Err(err) => {
                warn!(target: "engine::heavy-compute", height = check_ts.height, %err, "parent fetch failed");
                return;
            }
        };
        if parent_ts.height < end_height {
            break;
        }

        // The recompute is the expensive call that stresses the node; an
        // overloaded node may refuse it, which is not a safety violation.
        let computed = match node.client.state_compute(parent_ts.height, &parent_key).await {
            Ok(output) => output,
            Err(err) => {
                warn!(target: "engine::heavy-compute", height = parent_ts.height, %err, "state compute failed");
                return;
            }
        };

        let expected = check_ts.parent_state().unwrap_or_default().to_string();
        let matches = computed.root.root == expected;

        always(
            matches,
            "recomputed state root matches stored state",
            json!({
                "node": node.name,
                "node_type": node.node_type(),
                "exec_height": parent_ts.height,
                "check_height": check_ts.height,
                "computed_root": computed.root.root,
                "expected_root": expected,
                "epochs_checked": epochs_checked,
            }),
        );
        if !matches {
            warn!(
                target: "engine::heavy-compute",
                node = %node.name,
                height = parent_ts.height,
                computed = %computed.root.root,
                expected = %expected,
                "STATE MISMATCH"
            );
            return;
        }

        check_ts = parent_ts;
        epochs_checked += 1;
    }

    debug!(target: "engine::heavy-compute", node = %node.name, epochs_checked, "ok");
    sometimes(
        epochs_checked > 0,
        "heavy computation path exercised",
        json!({ "node": node.name, "epochs_checked": epochs_checked }),
    );
}

/// Picks one of the six audit sub-checks at random.
pub async fn chain_monitor(ctx: &EngineContext) {
    match ctx.rng.next_int(6) {
        0 => tipset_consensus(ctx).await,
        1 => height_progression(ctx).await,
        2 => peer_count(ctx).await,
        3 => head_comparison(ctx).await,
        4 => state_root_comparison(ctx).await,
        _ => state_audit(ctx).await,
    }
}

/// True only when every node's head has passed `min_epoch`.
async fn all_nodes_past_epoch(ctx: &EngineContext, min_epoch: i64) -> bool {
    for handle in ctx.pool.handles() {
        match handle.client.chain_head().await {
            Ok(head) if head.height >= min_epoch => {}
            _ => return false,
        }
    }
    true
}

/// Minimum finalized height across nodes: the safe anchor for state
/// assertions. `None` when any node fails to answer.
async fn finalized_floor(ctx: &EngineContext) -> Option<i64> {
    let mut floor: Option<i64> = None;
    for handle in ctx.pool.handles() {
        match handle.client.chain_get_finalized_tip_set().await {
            Ok(ts) => {
                floor = Some(floor.map_or(ts.height, |f: i64| f.min(ts.height)));
            }
            Err(err) => {
                warn!(target: "engine::monitor", node = %handle.name, %err, "finalized tipset query failed");
                return None;
            }
        }
    }
    floor
}

/// All nodes must agree on the tipset key at a random finalized height.
async fn tipset_consensus(ctx: &EngineContext) {
    if ctx.pool.len() < 2 || !all_nodes_past_epoch(ctx, BOOTSTRAP_MIN_EPOCH).await {
        return;
    }
    let Some(floor) = finalized_floor(ctx).await else {
        return;
    };
    if floor < FINALIZED_MIN_HEIGHT {
        return;
    }

    let check_height = ctx.rng.next_int(floor as usize) as i64 + 1;

    let queries = ctx.pool.handles().iter().map(|handle| async move {
        let finalized = handle.client.chain_get_finalized_tip_set().await?;
        let ts = handle
            .client
            .chain_get_tip_set_by_height(check_height, &finalized.key())
            .await?;
        Ok::<_, squall_chain_client::RpcClientError>((handle.name.clone(), ts.key().to_key_string()))
    });

    let mut by_key: HashMap<String, Vec<String>> = HashMap::new();
    let mut errors = 0usize;
    for result in join_all(queries).await {
        match result {
            Ok((name, key)) => by_key.entry(key).or_default().push(name),
            Err(err) => {
                warn!(target: "engine::monitor", %err, "tipset query failed");
                errors += 1;
            }
        }
    }
    if errors == ctx.pool.len() {
        return;
    }

    let consensus = by_key.len() == 1 && errors == 0;
    always(
        consensus,
        "all nodes agree on the same finalized tipset",
        json!({
            "height": check_height,
            "finalized_at": floor,
            "unique_tipsets": by_key.len(),
            "nodes_checked": ctx.pool.len(),
            "errors": errors,
        }),
    );
    sometimes(
        consensus,
        "tipset consensus verified across nodes",
        json!({ "height": check_height }),
    );
}

/// Finalized heights across nodes stay within the acceptable spread.
async fn height_progression(ctx: &EngineContext) {
    let mut heights: HashMap<String, i64> = HashMap::new();
    for handle in ctx.pool.handles() {
        match handle.client.chain_get_finalized_tip_set().await {
            Ok(ts) => {
                heights.insert(handle.name.clone(), ts.height);
            }
            Err(err) => {
                warn!(target: "engine::monitor", node = %handle.name, %err, "finalized tipset query failed");
            }
        }
    }
    if heights.is_empty() {
        return;
    }

    let min = *heights.values().min().unwrap();
    let max = *heights.values().max().unwrap();

    // A node still bootstrapping legitimately trails far behind.
    if min < FINALIZED_MIN_HEIGHT {
        return;
    }

    let spread = max - min;
    sometimes(
        spread <= MAX_HEIGHT_SPREAD,
        "node chain heights are within acceptable range",
        json!({ "heights": heights, "spread": spread, "min": min, "max": max }),
    );
    sometimes(
        min > 0,
        "all nodes have advanced past genesis",
        json!({ "min_height": min }),
    );
}

/// Every node must report at least one peer.
async fn peer_count(ctx: &EngineContext) {
    for handle in ctx.pool.handles() {
        let peers = match handle.client.net_peers().await {
            Ok(peers) => peers,
            Err(err) => {
                warn!(target: "engine::monitor", node = %handle.name, %err, "peer query failed");
                continue;
            }
        };
        always(
            !peers.is_empty(),
            "node has active peer connections",
            json!({
                "node": handle.name,
                "node_type": handle.node_type(),
                "peer_count": peers.len(),
            }),
        );
        sometimes(
            !peers.is_empty(),
            "peer connectivity confirmed",
            json!({ "node": handle.name, "peer_count": peers.len() }),
        );
    }
}

/// Nodes whose finalized heads sit at the same height must agree on the key.
async fn head_comparison(ctx: &EngineContext) {
    if ctx.pool.len() < 2 || !all_nodes_past_epoch(ctx, BOOTSTRAP_MIN_EPOCH).await {
        return;
    }

    let mut by_height: HashMap<i64, Vec<(String, String)>> = HashMap::new();
    for handle in ctx.pool.handles() {
        match handle.client.chain_get_finalized_tip_set().await {
            Ok(ts) => by_height
                .entry(ts.height)
                .or_default()
                .push((handle.name.clone(), ts.key().to_key_string())),
            Err(err) => {
                warn!(target: "engine::monitor", node = %handle.name, %err, "finalized head query failed");
            }
        }
    }

    for (height, group) in by_height {
        if group.len() < 2 {
            continue;
        }
        let first = &group[0].1;
        let all_match = group.iter().all(|(_, key)| key == first);
        always(
            all_match,
            "nodes at the same height agree on the same tipset",
            json!({ "height": height, "nodes": group.len(), "keys_match": all_match }),
        );
    }
}

/// Collects each node's parent-state root at a finalized height; aborts
/// silently on any RPC error. Shared with the reorg driver's convergence
/// verification.
pub(crate) async fn state_roots_at_random_height(
    ctx: &EngineContext,
) -> Option<(i64, i64, HashMap<String, Vec<String>>)> {
    let floor = finalized_floor(ctx).await?;
    if floor < FINALIZED_MIN_HEIGHT {
        return None;
    }
    let check_height = ctx.rng.next_int(floor as usize) as i64 + 1;

    let mut roots: HashMap<String, Vec<String>> = HashMap::new();
    for handle in ctx.pool.handles() {
        let finalized = match handle.client.chain_get_finalized_tip_set().await {
            Ok(ts) => ts,
            Err(_) => return None,
        };
        let ts = match handle
            .client
            .chain_get_tip_set_by_height(check_height, &finalized.key())
            .await
        {
            Ok(ts) => ts,
            Err(_) => return None,
        };
        roots
            .entry(ts.parent_state().unwrap_or_default().to_string())
            .or_default()
            .push(handle.name.clone());
    }
    Some((check_height, floor, roots))
}

/// Parent-state roots at a random finalized height agree across all nodes.
async fn state_root_comparison(ctx: &EngineContext) {
    if ctx.pool.len() < 2 || !all_nodes_past_epoch(ctx, BOOTSTRAP_MIN_EPOCH).await {
        return;
    }
    let Some((check_height, floor, roots)) = state_roots_at_random_height(ctx).await else {
        return;
    };

    let consistent = roots.len() == 1;
    always(
        consistent,
        "chain state is consistent across all nodes",
        json!({
            "height": check_height,
            "finalized_at": floor,
            "state_roots": roots,
            "nodes_checked": ctx.pool.len(),
        }),
    );
    if consistent {
        debug!(target: "engine::monitor", height = check_height, finalized = floor, "state roots agree");
        sometimes(
            true,
            "shared chain state verified across nodes",
            json!({ "height": check_height }),
        );
    } else {
        warn!(target: "engine::monitor", height = check_height, ?roots, "DIVERGENCE");
    }
}

/// Full audit: state-root equality, then per-block parent-message and
/// parent-receipt count equality between two nodes, and message/receipt
/// count consistency within a node.
async fn state_audit(ctx: &EngineContext) {
    if ctx.pool.len() < 2 || !all_nodes_past_epoch(ctx, BOOTSTRAP_MIN_EPOCH).await {
        return;
    }
    let Some(floor) = finalized_floor(ctx).await else {
        return;
    };
    if floor < FINALIZED_MIN_HEIGHT {
        return;
    }
    let check_height = ctx.rng.next_int(floor as usize) as i64 + 1;

    let mut roots: HashMap<String, Vec<String>> = HashMap::new();
    let mut tipset_cids = Vec::new();
    for handle in ctx.pool.handles() {
        let finalized = match handle.client.chain_get_finalized_tip_set().await {
            Ok(ts) => ts,
            Err(_) => return,
        };
        let ts = match handle
            .client
            .chain_get_tip_set_by_height(check_height, &finalized.key())
            .await
        {
            Ok(ts) => ts,
            Err(_) => return,
        };
        roots
            .entry(ts.parent_state().unwrap_or_default().to_string())
            .or_default()
            .push(handle.name.clone());
        if tipset_cids.is_empty() {
            tipset_cids = ts.cids.clone();
        }
    }

    let roots_match = roots.len() == 1;
    always(
        roots_match,
        "state root is consistent after execution",
        json!({
            "height": check_height,
            "finalized_at": floor,
            "unique_states": roots.len(),
            "state_roots": roots,
        }),
    );
    if !roots_match {
        warn!(target: "engine::monitor", height = check_height, ?roots, "STATE ROOT DIVERGENCE");
        return;
    }
    if tipset_cids.is_empty() {
        return;
    }

    let node_a = ctx.pool.get(0);
    let node_b = ctx.pool.get(1);
    for block in &tipset_cids {
        let (messages_a, messages_b) = tokio::join!(
            node_a.client.chain_get_parent_messages(block),
            node_b.client.chain_get_parent_messages(block),
        );
        let (Ok(messages_a), Ok(messages_b)) = (messages_a, messages_b) else {
            continue;
        };
        let (receipts_a, receipts_b) = tokio::join!(
            node_a.client.chain_get_parent_receipts(block),
            node_b.client.chain_get_parent_receipts(block),
        );
        let (Ok(receipts_a), Ok(receipts_b)) = (receipts_a, receipts_b) else {
            continue;
        };

        let block_short = &block.root[..block.root.len().min(16)];
        always(
            messages_a.len() == messages_b.len(),
            "parent messages match across nodes",
            json!({
                "height": check_height,
                "block": block_short,
                "count_a": messages_a.len(),
                "count_b": messages_b.len(),
            }),
        );
        always(
            receipts_a.len() == receipts_b.len(),
            "parent receipts match across nodes",
            json!({
                "height": check_height,
                "block": block_short,
                "count_a": receipts_a.len(),
                "count_b": receipts_b.len(),
            }),
        );
        always(
            messages_a.len() == receipts_a.len(),
            "message and receipt counts match",
            json!({
                "height": check_height,
                "block": block_short,
                "messages": messages_a.len(),
                "receipts": receipts_a.len(),
            }),
        );
    }

    debug!(target: "engine::monitor", height = check_height, "state audit ok");
    sometimes(
        true,
        "state audit completed successfully",
        json!({ "height": check_height }),
    );
}

pub(crate) const POST_REORG_MAX_SPREAD: i64 = MAX_HEIGHT_SPREAD;
