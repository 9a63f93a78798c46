use std::path::PathBuf;

use squall_harness::{env_flag, env_or_default, env_u64};

/// Fuzzer configuration, resolved once at startup from the environment.
#[derive(Debug, Clone)]
pub struct FuzzerConfig {
    pub enabled: bool,
    pub nodes: Vec<String>,
    pub devgen_dir: PathBuf,
    pub rpc_port: String,
    pub rate_ms: u64,
    pub identity_pool_size: usize,
    pub rng_seed: u64,
    pub debug: bool,
}

impl FuzzerConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: env_or_default("FUZZER_ENABLED", "1") == "1",
            nodes: env_or_default("STRESS_NODES", "lotus0")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            devgen_dir: PathBuf::from(env_or_default("FUZZER_DEVGEN_DIR", "/root/devgen")),
            rpc_port: env_or_default("STRESS_RPC_PORT", "1234"),
            rate_ms: env_u64("FUZZER_RATE_MS", 500),
            identity_pool_size: env_u64("FUZZER_IDENTITY_POOL_SIZE", 20) as usize,
            rng_seed: env_u64("FUZZER_RNG_SEED", 0),
            debug: env_flag("FUZZER_DEBUG"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_enable_switch() {
        let config = FuzzerConfig::from_env();
        assert!(config.enabled);
        assert_eq!(config.rate_ms, 500);
        assert_eq!(config.identity_pool_size, 20);

        std::env::set_var("FUZZER_ENABLED", "0");
        assert!(!FuzzerConfig::from_env().enabled);
        std::env::remove_var("FUZZER_ENABLED");
    }
}
