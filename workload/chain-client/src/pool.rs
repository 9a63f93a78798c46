use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::client::FullNodeClient;
use crate::error::RpcClientError;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no nodes connected")]
    NoNodes,
    #[error(transparent)]
    Client(#[from] RpcClientError),
}

/// Connection parameters for the fleet. Nodes whose name starts with
/// `forest` use the forest port; everything else uses the default port.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub names: Vec<String>,
    pub port: String,
    pub forest_port: String,
    /// Directory holding `<name>/<name>-jwt` bearer-token files.
    pub devgen_dir: PathBuf,
}

/// One named, authenticated node connection.
pub struct NodeHandle {
    pub name: String,
    pub client: FullNodeClient,
}

impl NodeHandle {
    /// Node family by name prefix, mirrored in assertion details.
    pub fn node_type(&self) -> &'static str {
        node_type(&self.name)
    }
}

pub fn node_type(name: &str) -> &'static str {
    if name.starts_with("forest") {
        "forest"
    } else {
        "lotus"
    }
}

/// The fixed set of node connections shared by every action.
pub struct NodePool {
    handles: Vec<NodeHandle>,
}

impl NodePool {
    /// Connects to every configured node. Nodes that fail to set up are
    /// skipped with a log line; zero connected nodes is fatal.
    pub fn connect(config: &PoolConfig) -> Result<Self, PoolError> {
        let mut handles = Vec::new();
        for raw_name in &config.names {
            let name = raw_name.trim();
            if name.is_empty() {
                continue;
            }

            let port = if name.starts_with("forest") && !config.forest_port.is_empty() {
                &config.forest_port
            } else {
                &config.port
            };
            let endpoint = format!("http://{name}:{port}/rpc/v1");

            let token_path = config.devgen_dir.join(name).join(format!("{name}-jwt"));
            let bearer = match fs::read_to_string(&token_path) {
                Ok(token) => Some(token.trim().to_string()),
                Err(err) => {
                    warn!(
                        target: "chain::pool",
                        node = name,
                        path = %token_path.display(),
                        %err,
                        "no JWT, connecting without auth"
                    );
                    None
                }
            };

            match FullNodeClient::new(&endpoint, bearer) {
                Ok(client) => {
                    info!(target: "chain::pool", node = name, %endpoint, "connected");
                    handles.push(NodeHandle {
                        name: name.to_string(),
                        client,
                    });
                }
                Err(err) => {
                    warn!(target: "chain::pool", node = name, %endpoint, %err, "cannot connect");
                }
            }
        }

        if handles.is_empty() {
            return Err(PoolError::NoNodes);
        }
        info!(target: "chain::pool", nodes = handles.len(), "pool ready");
        Ok(Self { handles })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn handles(&self) -> &[NodeHandle] {
        &self.handles
    }

    pub fn get(&self, index: usize) -> &NodeHandle {
        &self.handles[index]
    }

    pub fn by_name(&self, name: &str) -> Option<&NodeHandle> {
        self.handles.iter().find(|h| h.name == name)
    }

    /// First node in configuration order; the reference node for nonce
    /// initialisation and pending-deploy resolution.
    pub fn primary(&self) -> &NodeHandle {
        &self.handles[0]
    }

    pub fn names(&self) -> Vec<&str> {
        self.handles.iter().map(|h| h.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_type_is_prefix_based() {
        assert_eq!(node_type("lotus0"), "lotus");
        assert_eq!(node_type("forest1"), "forest");
        assert_eq!(node_type("other"), "lotus");
    }

    #[test]
    fn connect_skips_blank_names_and_requires_one_node() {
        let config = PoolConfig {
            names: vec!["".to_string(), "   ".to_string()],
            port: "1234".to_string(),
            forest_port: "3456".to_string(),
            devgen_dir: PathBuf::from("/nonexistent"),
        };
        assert!(matches!(
            NodePool::connect(&config),
            Err(PoolError::NoNodes)
        ));
    }

    #[test]
    fn connect_builds_handles_without_reaching_the_network() {
        let config = PoolConfig {
            names: vec!["lotus0".to_string(), "forest0".to_string()],
            port: "1234".to_string(),
            forest_port: "3456".to_string(),
            devgen_dir: PathBuf::from("/nonexistent"),
        };
        let pool = NodePool::connect(&config).expect("pool");
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.primary().name, "lotus0");
        assert_eq!(
            pool.by_name("forest0").unwrap().client.endpoint().as_str(),
            "http://forest0:3456/rpc/v1"
        );
    }
}
