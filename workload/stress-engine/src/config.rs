use std::path::PathBuf;

use squall_harness::{env_flag, env_or_default, env_u64};

/// Engine configuration, resolved once at startup from the environment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub nodes: Vec<String>,
    pub rpc_port: String,
    pub forest_rpc_port: String,
    pub keystore_path: PathBuf,
    pub devgen_dir: PathBuf,
    pub wait_height: i64,
    pub rate_ms: u64,
    pub rng_seed: u64,
    pub debug: bool,
    pub payments_env_path: PathBuf,
    pub provider_key_path: PathBuf,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            nodes: env_or_default("STRESS_NODES", "lotus0")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            rpc_port: env_or_default("STRESS_RPC_PORT", "1234"),
            forest_rpc_port: env_or_default("STRESS_FOREST_RPC_PORT", "3456"),
            keystore_path: PathBuf::from(env_or_default(
                "STRESS_KEYSTORE_PATH",
                "/shared/stress_keystore.json",
            )),
            devgen_dir: PathBuf::from(env_or_default("STRESS_DEVGEN_DIR", "/root/devgen")),
            wait_height: env_u64("STRESS_WAIT_HEIGHT", 10) as i64,
            rate_ms: env_u64("STRESS_RATE_MS", 0),
            rng_seed: env_u64("STRESS_RNG_SEED", 0),
            debug: env_flag("STRESS_DEBUG"),
            payments_env_path: PathBuf::from(env_or_default(
                "STRESS_PAYMENTS_ENV",
                "/shared/environment.env",
            )),
            provider_key_path: PathBuf::from(env_or_default(
                "STRESS_PROVIDER_KEY_PATH",
                "/shared/curio/private_key",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_a_single_local_node() {
        let config = EngineConfig::from_env();
        assert!(!config.nodes.is_empty());
        assert_eq!(config.rpc_port, "1234");
        assert_eq!(config.forest_rpc_port, "3456");
        assert_eq!(config.wait_height, 10);
    }

    #[test]
    fn node_list_is_comma_separated_and_trimmed() {
        std::env::set_var("STRESS_NODES", " lotus0, forest0 ,,lotus1 ");
        let config = EngineConfig::from_env();
        assert_eq!(config.nodes, vec!["lotus0", "forest0", "lotus1"]);
        std::env::remove_var("STRESS_NODES");
    }
}
