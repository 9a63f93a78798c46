//! Reorg driver: rapid partition/heal cycles against one victim node,
//! followed by convergence verification. Safety: finalized parent-state
//! roots must agree across nodes no matter how many cycles ran. Liveness:
//! after the convergence window the state check and the height-spread check
//! pass together.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;
use tracing::{info, warn};

use squall_chain_client::{NodeHandle, PeerAddrInfo};
use squall_harness::{always, sometimes};

use crate::context::EngineContext;
use crate::vectors::consensus::{state_roots_at_random_height, POST_REORG_MAX_SPREAD};

const MAX_CYCLES_PER_CALL: usize = 10;
const CONVERGE_WAIT: Duration = Duration::from_secs(90);
const EPOCH_WAIT_TIMEOUT: Duration = Duration::from_secs(30);
const POST_HEAL_PAUSE: Duration = Duration::from_secs(2);
const RECONNECT_PAUSE: Duration = Duration::from_secs(3);
/// Per-epoch sleep when no other node can be watched.
const FALLBACK_BLOCK_TIME: Duration = Duration::from_secs(6);

pub async fn reorg_chaos(ctx: &EngineContext) {
    if ctx.pool.len() < 2 {
        return;
    }

    let victim = ctx.pool.get(ctx.rng.next_int(ctx.pool.len()));
    let cycles = ctx.rng.next_int(MAX_CYCLES_PER_CALL) + 1;
    info!(
        target: "engine::reorg",
        victim = %victim.name,
        cycles,
        "starting rapid partition cycles"
    );

    // Canonical listen addresses of every other node, the reliable fallback
    // for reconnection after a partition.
    let known_peers = collect_listen_addrs(ctx, &victim.name).await;

    let mut completed = 0usize;
    for cycle in 0..cycles {
        let peers = match victim.client.net_peers().await {
            Ok(peers) => peers,
            Err(err) => {
                warn!(target: "engine::reorg", cycle = cycle + 1, %err, "peer query failed");
                break;
            }
        };
        if peers.is_empty() {
            warn!(target: "engine::reorg", cycle = cycle + 1, "victim has no peers, reconnecting");
            for peer in &known_peers {
                let _ = victim.client.net_connect(peer).await;
            }
            sleep(RECONNECT_PAUSE).await;
            continue;
        }

        let saved_peers = peers.clone();

        // Partition: cut the victim off from every current peer.
        let mut disconnected = 0usize;
        for peer in &peers {
            if victim.client.net_disconnect(&peer.id).await.is_ok() {
                disconnected += 1;
            }
        }
        let post_peers = victim.client.net_peers().await.unwrap_or_default();
        let isolated = post_peers.is_empty();

        sometimes(
            isolated,
            "reorg victim isolated",
            json!({
                "victim": victim.name,
                "victim_type": victim.node_type(),
                "cycle": cycle + 1,
                "total": cycles,
                "pre_peers": peers.len(),
                "disconnected": disconnected,
                "post_peers": post_peers.len(),
            }),
        );
        info!(
            target: "engine::reorg",
            cycle = cycle + 1,
            cycles,
            victim = %victim.name,
            disconnected,
            isolated,
            "SPLIT"
        );

        // Let the main partition mine a few blocks past the victim.
        let epochs = ctx.rng.next_int(3) + 1;
        wait_for_epochs_on_other(ctx, &victim.name, epochs as i64).await;

        // Heal: saved peers first, canonical registry as backstop.
        let mut reconnected = 0usize;
        for peer in &saved_peers {
            if victim.client.net_connect(peer).await.is_ok() {
                reconnected += 1;
            }
        }
        for peer in &known_peers {
            let _ = victim.client.net_connect(peer).await;
        }
        info!(
            target: "engine::reorg",
            cycle = cycle + 1,
            cycles,
            victim = %victim.name,
            reconnected,
            saved = saved_peers.len(),
            "HEAL"
        );

        sleep(POST_HEAL_PAUSE).await;
        completed += 1;
    }

    if completed == 0 {
        return;
    }
    sometimes(
        completed > 0,
        "reorg chaos executed",
        json!({ "victim": victim.name, "cycles": completed, "requested": cycles }),
    );

    info!(target: "engine::reorg", cycles = completed, "waiting for convergence");
    sleep(CONVERGE_WAIT).await;
    verify_post_reorg_state(ctx, victim, completed).await;
}

/// Listen addresses of every node except the excluded one.
async fn collect_listen_addrs(ctx: &EngineContext, exclude: &str) -> Vec<PeerAddrInfo> {
    let mut infos = Vec::new();
    for handle in ctx.pool.handles() {
        if handle.name == exclude {
            continue;
        }
        match handle.client.net_addrs_listen().await {
            Ok(info) => infos.push(info),
            Err(err) => {
                warn!(target: "engine::reorg", node = %handle.name, %err, "listen addr query failed");
            }
        }
    }
    infos
}

/// Waits until a non-victim node advances `epochs` epochs, with a hard
/// timeout and a time-based fallback when no watcher is available.
async fn wait_for_epochs_on_other(ctx: &EngineContext, exclude: &str, epochs: i64) {
    let Some(watch) = ctx.pool.handles().iter().find(|h| h.name != exclude) else {
        sleep(FALLBACK_BLOCK_TIME * epochs as u32).await;
        return;
    };

    let start = match watch.client.chain_head().await {
        Ok(head) => head.height,
        Err(_) => {
            sleep(FALLBACK_BLOCK_TIME * epochs as u32).await;
            return;
        }
    };
    let target = start + epochs;

    let wait = async {
        loop {
            if let Ok(head) = watch.client.chain_head().await {
                if head.height >= target {
                    return;
                }
            }
            sleep(Duration::from_secs(1)).await;
        }
    };
    if tokio::time::timeout(EPOCH_WAIT_TIMEOUT, wait).await.is_err() {
        warn!(
            target: "engine::reorg",
            watching = %watch.name,
            target,
            "epoch wait timed out"
        );
    }
}

/// Post-chaos verification: network healed, finalized state consistent,
/// height spread within bounds.
async fn verify_post_reorg_state(ctx: &EngineContext, victim: &NodeHandle, cycles: usize) {
    for handle in ctx.pool.handles() {
        let peers = match handle.client.net_peers().await {
            Ok(peers) => peers,
            Err(_) => continue,
        };
        let has_peers = !peers.is_empty();
        always(
            has_peers,
            "post-reorg network healed",
            json!({
                "node": handle.name,
                "node_type": handle.node_type(),
                "victim": victim.name,
                "peer_count": peers.len(),
                "cycles": cycles,
            }),
        );
        if !has_peers {
            warn!(target: "engine::reorg", node = %handle.name, "no peers after heal");
        }
    }

    let Some((check_height, floor, roots)) = state_roots_at_random_height(ctx).await else {
        warn!(target: "engine::reorg", "finalized state too shallow for post-reorg check");
        return;
    };
    let states_match = roots.len() == 1;
    always(
        states_match,
        "post-reorg state consistent",
        json!({
            "victim": victim.name,
            "height": check_height,
            "finalized_at": floor,
            "unique_states": roots.len(),
            "state_roots": roots,
            "cycles": cycles,
        }),
    );

    let mut heights: HashMap<String, i64> = HashMap::new();
    for handle in ctx.pool.handles() {
        if let Ok(head) = handle.client.chain_head().await {
            heights.insert(handle.name.clone(), head.height);
        }
    }
    if heights.len() < 2 {
        return;
    }
    let min = *heights.values().min().unwrap();
    let max = *heights.values().max().unwrap();
    let spread = max - min;
    let acceptable = spread <= POST_REORG_MAX_SPREAD;
    always(
        acceptable,
        "post-reorg height spread within bounds",
        json!({ "victim": victim.name, "heights": heights, "spread": spread, "cycles": cycles }),
    );

    let converged = states_match && acceptable;
    sometimes(
        converged,
        "reorg convergence achieved",
        json!({
            "victim": victim.name,
            "cycles": cycles,
            "states_match": states_match,
            "spread": spread,
        }),
    );
    if converged {
        info!(
            target: "engine::reorg",
            cycles,
            victim = %victim.name,
            height = check_height,
            spread,
            "convergence verified"
        );
    } else {
        warn!(
            target: "engine::reorg",
            cycles,
            states_match,
            spread,
            "DIVERGENCE after partition cycles"
        );
    }
}
