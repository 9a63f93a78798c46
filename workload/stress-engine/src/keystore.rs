//! Wallet set loaded from the keystore JSON produced during genesis
//! preparation, plus the deterministic derivation that produced it.

use std::fs;
use std::path::Path;

use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::{info, warn};

use squall_chain_client::Address;

#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("cannot read keystore at {path}: {source}")]
    Unreadable {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse keystore: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("no valid keys loaded from keystore")]
    Empty,
}

/// Keystore file entry, matching the format written by genesis preparation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeystoreEntry {
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "PrivateKey")]
    pub private_key: String,
}

/// An in-memory wallet: chain address plus raw secp256k1 secret.
#[derive(Debug, Clone)]
pub struct Wallet {
    pub address: Address,
    pub key: Vec<u8>,
}

/// Loads the wallet set. Entries with an unparseable address or key are
/// skipped with a warning; an empty result is fatal.
pub fn load_keystore(path: &Path) -> Result<Vec<Wallet>, KeystoreError> {
    let data = fs::read_to_string(path).map_err(|source| KeystoreError::Unreadable {
        path: path.display().to_string(),
        source,
    })?;
    let entries: Vec<KeystoreEntry> = serde_json::from_str(&data)?;

    let mut wallets = Vec::with_capacity(entries.len());
    for entry in entries {
        let address = match Address::parse(&entry.address) {
            Ok(address) => address,
            Err(err) => {
                warn!(target: "engine::keystore", address = %entry.address, %err, "skipping invalid address");
                continue;
            }
        };
        let key = match hex::decode(&entry.private_key) {
            Ok(key) if key.len() == 32 => key,
            _ => {
                warn!(target: "engine::keystore", address = %entry.address, "skipping entry with bad private key hex");
                continue;
            }
        };
        wallets.push(Wallet { address, key });
    }

    if wallets.is_empty() {
        return Err(KeystoreError::Empty);
    }
    info!(target: "engine::keystore", wallets = wallets.len(), "keystore loaded");
    Ok(wallets)
}

/// Derives the wallet secret for `(master_seed, index)` via HKDF-SHA256.
/// Pure: the same inputs always produce the same 32 bytes, so reruns see
/// the same wallet set.
pub fn derive_wallet_key(master_seed: &str, index: u32) -> [u8; 32] {
    let hkdf = Hkdf::<Sha256>::new(None, master_seed.as_bytes());
    let info = format!("stress-wallet-{index}");
    let mut key = [0u8; 32];
    hkdf.expand(info.as_bytes(), &mut key)
        .expect("32 bytes is a valid hkdf output length");
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn derivation_is_pure_and_index_sensitive() {
        let a = derive_wallet_key("seed-v1", 0);
        let b = derive_wallet_key("seed-v1", 0);
        let c = derive_wallet_key("seed-v1", 1);
        let d = derive_wallet_key("seed-v2", 0);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn loads_valid_entries_and_skips_broken_ones() {
        let addr = squall_chain_client::signing::secp256k1_address(&[0x11; 32]).unwrap();
        let entries = vec![
            KeystoreEntry {
                address: addr.to_string(),
                private_key: hex::encode([0x11u8; 32]),
            },
            KeystoreEntry {
                address: "not-an-address".to_string(),
                private_key: hex::encode([0x22u8; 32]),
            },
            KeystoreEntry {
                address: addr.to_string(),
                private_key: "zz".to_string(),
            },
        ];
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&entries).unwrap().as_bytes())
            .unwrap();

        let wallets = load_keystore(file.path()).expect("load");
        assert_eq!(wallets.len(), 1);
        assert_eq!(wallets[0].address, addr);
    }

    #[test]
    fn empty_keystore_is_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[]").unwrap();
        assert!(matches!(
            load_keystore(file.path()),
            Err(KeystoreError::Empty)
        ));
    }

    #[test]
    fn missing_file_is_fatal() {
        assert!(matches!(
            load_keystore(Path::new("/nonexistent/keystore.json")),
            Err(KeystoreError::Unreadable { .. })
        ));
    }
}
