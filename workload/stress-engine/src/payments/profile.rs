//! Deployment profile for the token layer, parsed from the environment file
//! the contract-deployment tooling writes. A missing file simply means the
//! profile is inactive.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use parking_lot::Mutex;
use tracing::{info, warn};

use squall_chain_client::signing;

/// Addresses, keys, and runtime state for the payment-contract vectors.
pub struct PaymentsProfile {
    /// ERC-20 token under the supply invariants. Absent when the token was
    /// not deployed; the monitor then skips the supply checks.
    pub token_addr: Option<[u8; 20]>,
    /// Payment contract. Required for the profile to activate.
    pub pay_addr: [u8; 20],
    /// Storage-service operator contract.
    pub service_addr: Option<[u8; 20]>,
    /// Service-provider registry.
    pub registry_addr: Option<[u8; 20]>,

    pub deployer_key: Option<Vec<u8>>,
    pub client_key: Option<Vec<u8>>,
    pub provider_key: Option<Vec<u8>>,

    pub deployer_eth: Option<[u8; 20]>,
    pub client_eth: Option<[u8; 20]>,
    pub provider_eth: Option<[u8; 20]>,

    /// Rail created or discovered by the lifecycle vectors.
    pub active_rail: Mutex<Option<u128>>,
}

impl PaymentsProfile {
    /// Loads the profile. Returns `None` when the environment file is
    /// absent or does not name a payment contract.
    pub fn load(env_path: &Path, provider_key_path: &Path) -> Option<Self> {
        let data = fs::read_to_string(env_path).ok()?;
        let env = parse_env_lines(&data);

        let pay_addr = match env.get("FILECOIN_PAY_ADDRESS").and_then(|v| parse_eth_addr(v)) {
            Some(addr) => addr,
            None => {
                warn!(
                    target: "engine::payments",
                    path = %env_path.display(),
                    "environment file found but FILECOIN_PAY_ADDRESS missing or invalid"
                );
                return None;
            }
        };

        let token_addr = env.get("USDFC_ADDRESS").and_then(|v| parse_eth_addr(v));
        if token_addr.is_none() {
            warn!(target: "engine::payments", "USDFC_ADDRESS missing, supply invariants will be skipped");
        }

        let deployer_key = env.get("DEPLOYER_PRIVATE_KEY").and_then(|v| parse_hex_key(v));
        let client_key = env.get("CLIENT_PRIVATE_KEY").and_then(|v| parse_hex_key(v));

        // Eth addresses are re-derived from the keys whenever possible so the
        // sender seen by the contracts always matches the address used in
        // view calls. The env-file address is only a fallback.
        let client_eth = client_key
            .as_deref()
            .and_then(|key| signing::eth_address(key).ok())
            .or_else(|| env.get("CLIENT_ETH_ADDRESS").and_then(|v| parse_eth_addr(v)));
        let deployer_eth = deployer_key
            .as_deref()
            .and_then(|key| signing::eth_address(key).ok())
            .or_else(|| env.get("DEPLOYER_ETH_ADDRESS").and_then(|v| parse_eth_addr(v)));

        let provider_key = fs::read_to_string(provider_key_path)
            .ok()
            .and_then(|raw| parse_hex_key(raw.trim()));
        let provider_eth = provider_key
            .as_deref()
            .and_then(|key| signing::eth_address(key).ok());

        let profile = Self {
            token_addr,
            pay_addr,
            service_addr: env.get("FWSS_PROXY_ADDRESS").and_then(|v| parse_eth_addr(v)),
            registry_addr: env
                .get("SERVICE_PROVIDER_REGISTRY_PROXY_ADDRESS")
                .and_then(|v| parse_eth_addr(v)),
            deployer_key,
            client_key,
            provider_key,
            deployer_eth,
            client_eth,
            provider_eth,
            active_rail: Mutex::new(None),
        };
        info!(
            target: "engine::payments",
            token = profile.token_addr.map(hex::encode).unwrap_or_default(),
            pay = hex::encode(profile.pay_addr),
            "payments profile loaded"
        );
        Some(profile)
    }
}

fn parse_env_lines(data: &str) -> HashMap<String, String> {
    let mut env = HashMap::new();
    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            env.insert(key.to_string(), value.to_string());
        }
    }
    env
}

fn parse_eth_addr(raw: &str) -> Option<[u8; 20]> {
    let stripped = raw.trim().trim_start_matches("0x").trim_start_matches("0X");
    let bytes = hex::decode(stripped).ok()?;
    bytes.try_into().ok()
}

fn parse_hex_key(raw: &str) -> Option<Vec<u8>> {
    let stripped = raw.trim().trim_start_matches("0x").trim_start_matches("0X");
    let bytes = hex::decode(stripped).ok()?;
    (bytes.len() == 32).then_some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_env(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn absent_file_deactivates_the_profile() {
        assert!(PaymentsProfile::load(
            Path::new("/nonexistent/environment.env"),
            Path::new("/nonexistent/key")
        )
        .is_none());
    }

    #[test]
    fn missing_pay_address_deactivates_the_profile() {
        let file = write_env("USDFC_ADDRESS=0x1111111111111111111111111111111111111111\n");
        assert!(
            PaymentsProfile::load(file.path(), Path::new("/nonexistent/key")).is_none()
        );
    }

    #[test]
    fn addresses_are_rederived_from_keys() {
        let key = [0x5au8; 32];
        let derived = signing::eth_address(&key).unwrap();
        let contents = format!(
            "# deployment output\n\
             FILECOIN_PAY_ADDRESS=0x2222222222222222222222222222222222222222\n\
             USDFC_ADDRESS=0x1111111111111111111111111111111111111111\n\
             CLIENT_PRIVATE_KEY=0x{}\n\
             CLIENT_ETH_ADDRESS=0x3333333333333333333333333333333333333333\n",
            hex::encode(key)
        );
        let file = write_env(&contents);
        let profile =
            PaymentsProfile::load(file.path(), Path::new("/nonexistent/key")).expect("profile");
        assert_eq!(profile.client_eth, Some(derived));
        assert_eq!(
            profile.pay_addr,
            parse_eth_addr("0x2222222222222222222222222222222222222222").unwrap()
        );
    }

    #[test]
    fn env_parsing_skips_comments_and_blank_lines() {
        let env = parse_env_lines("# comment\n\nA=1\nB=two=parts\n");
        assert_eq!(env.get("A").map(String::as_str), Some("1"));
        assert_eq!(env.get("B").map(String::as_str), Some("two=parts"));
    }

    #[test]
    fn malformed_keys_are_rejected() {
        assert!(parse_hex_key("0xzz").is_none());
        assert!(parse_hex_key("0011").is_none());
        assert!(parse_eth_addr("0x00112233").is_none());
    }
}
