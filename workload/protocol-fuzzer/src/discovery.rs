//! Target discovery: listen-address files written by each node's startup
//! script, the network name file, and the genesis CID over RPC.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId};
use tokio::time::sleep;
use tracing::{info, warn};

use squall_chain_client::FullNodeClient;

use crate::wire::RawCid;

const RETRY_INTERVAL: Duration = Duration::from_secs(5);
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(300);

/// A node reachable over libp2p.
#[derive(Debug, Clone)]
pub struct TargetNode {
    pub name: String,
    pub peer_id: PeerId,
    pub addr: Multiaddr,
}

/// Parses a full multiaddr ending in `/p2p/<peer-id>` into dial parts.
fn parse_target(name: &str, addr_str: &str) -> Option<TargetNode> {
    let full: Multiaddr = addr_str.parse().ok()?;
    let mut peer_id = None;
    let mut addr = Multiaddr::empty();
    for protocol in full.iter() {
        match protocol {
            Protocol::P2p(id) => peer_id = Some(id),
            other => addr.push(other),
        }
    }
    Some(TargetNode {
        name: name.to_string(),
        peer_id: peer_id?,
        addr,
    })
}

/// One discovery pass over `<devgen>/<name>/<name>-ipv4addr` files.
fn discover_once(names: &[String], devgen_dir: &Path) -> Vec<TargetNode> {
    let mut targets = Vec::new();
    for name in names {
        let addr_file = devgen_dir.join(name).join(format!("{name}-ipv4addr"));
        let raw = match fs::read_to_string(&addr_file) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(target: "fuzzer::discovery", node = %name, path = %addr_file.display(), %err, "skipping");
                continue;
            }
        };
        let addr_str = raw.trim();
        if addr_str.is_empty() {
            warn!(target: "fuzzer::discovery", node = %name, "empty address file");
            continue;
        }
        match parse_target(name, addr_str) {
            Some(target) => {
                info!(
                    target: "fuzzer::discovery",
                    node = %name,
                    peer = %target.peer_id,
                    addr = %target.addr,
                    "found"
                );
                targets.push(target);
            }
            None => {
                warn!(target: "fuzzer::discovery", node = %name, addr = %addr_str, "invalid multiaddr");
            }
        }
    }
    targets
}

/// Retries discovery until at least one node is found. `None` after the
/// startup window expires; the caller treats that as fatal.
pub async fn wait_for_targets(names: &[String], devgen_dir: &Path) -> Option<Vec<TargetNode>> {
    let deadline = Instant::now() + DISCOVERY_TIMEOUT;
    while Instant::now() < deadline {
        let targets = discover_once(names, devgen_dir);
        if !targets.is_empty() {
            info!(target: "fuzzer::discovery", found = targets.len(), total = names.len(), "targets ready");
            return Some(targets);
        }
        info!(target: "fuzzer::discovery", "no targets yet, retrying");
        sleep(RETRY_INTERVAL).await;
    }
    None
}

/// Reads the network name the first node writes at startup.
pub async fn wait_for_network_name(devgen_dir: &Path, first_node: &str) -> Option<String> {
    let path = devgen_dir.join(first_node).join("network_name");
    let deadline = Instant::now() + DISCOVERY_TIMEOUT;
    while Instant::now() < deadline {
        if let Ok(raw) = fs::read_to_string(&path) {
            let name = raw.trim();
            if !name.is_empty() {
                info!(target: "fuzzer::discovery", network = %name, "network name");
                return Some(name.to_string());
            }
        }
        sleep(RETRY_INTERVAL).await;
    }
    None
}

/// Fetches the genesis CID over unauthenticated RPC, retrying through the
/// startup window.
pub async fn discover_genesis_cid(rpc_url: &str) -> Option<RawCid> {
    let client = match FullNodeClient::new(rpc_url, None) {
        Ok(client) => client,
        Err(err) => {
            warn!(target: "fuzzer::discovery", %err, "bad rpc endpoint");
            return None;
        }
    };

    let deadline = Instant::now() + DISCOVERY_TIMEOUT;
    while Instant::now() < deadline {
        match client.chain_get_genesis().await {
            Ok(genesis) => {
                if let Some(first) = genesis.cids.first() {
                    match RawCid::parse(&first.root) {
                        Some(cid) => {
                            info!(target: "fuzzer::discovery", genesis = %first.root, "genesis cid");
                            return Some(cid);
                        }
                        None => {
                            warn!(target: "fuzzer::discovery", cid = %first.root, "unparseable genesis cid");
                            return None;
                        }
                    }
                }
                warn!(target: "fuzzer::discovery", "genesis response had no cids, retrying");
            }
            Err(err) => {
                warn!(target: "fuzzer::discovery", %err, "genesis fetch failed, retrying");
            }
        }
        sleep(RETRY_INTERVAL).await;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn target_parsing_splits_peer_id_from_dial_addr() {
        let target = parse_target(
            "lotus0",
            "/ip4/172.20.0.5/tcp/6000/p2p/12D3KooWDpJ7As7BWAwRMfu1VU2WCqNjvq387JEYKDBj4kx6nXTN",
        )
        .expect("target");
        assert_eq!(target.name, "lotus0");
        assert_eq!(target.addr.to_string(), "/ip4/172.20.0.5/tcp/6000");
    }

    #[test]
    fn multiaddrs_without_peer_ids_are_rejected() {
        assert!(parse_target("lotus0", "/ip4/172.20.0.5/tcp/6000").is_none());
        assert!(parse_target("lotus0", "garbage").is_none());
    }

    #[test]
    fn discovery_skips_missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let node_dir = dir.path().join("lotus0");
        fs::create_dir_all(&node_dir).unwrap();
        fs::write(node_dir.join("lotus0-ipv4addr"), "\n").unwrap();

        let names = vec!["lotus0".to_string(), "lotus1".to_string()];
        assert!(discover_once(&names, dir.path()).is_empty());

        fs::write(
            node_dir.join("lotus0-ipv4addr"),
            "/ip4/10.0.0.2/tcp/7777/p2p/12D3KooWDpJ7As7BWAwRMfu1VU2WCqNjvq387JEYKDBj4kx6nXTN\n",
        )
        .unwrap();
        let targets = discover_once(&names, dir.path());
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].name, "lotus0");
    }
}
