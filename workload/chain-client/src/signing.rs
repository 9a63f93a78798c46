//! Recoverable secp256k1 signing in the chain's two flavours.
//!
//! Native messages sign `blake2b-256(cid bytes)`; delegated (EVM)
//! transactions sign `keccak256(rlp preimage)`. Both produce the 65-byte
//! `r || s || v` layout the node expects.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha3::{Digest, Keccak256};
use thiserror::Error;

use crate::address::Address;
use crate::message::blake2b_256;

pub const SIGNATURE_LEN: usize = 65;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("invalid private key length {0} (expected 32)")]
    BadKeyLength(usize),
    #[error("invalid private key bytes")]
    BadKey,
    #[error("invalid signature bytes")]
    BadSignature,
    #[error("public key recovery failed")]
    RecoveryFailed,
}

fn signing_key(private_key: &[u8]) -> Result<SigningKey, SigningError> {
    if private_key.len() != 32 {
        return Err(SigningError::BadKeyLength(private_key.len()));
    }
    SigningKey::from_slice(private_key).map_err(|_| SigningError::BadKey)
}

fn sign_digest(private_key: &[u8], digest: &[u8]) -> Result<[u8; SIGNATURE_LEN], SigningError> {
    let key = signing_key(private_key)?;
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(digest)
        .map_err(|_| SigningError::BadKey)?;
    let mut out = [0u8; SIGNATURE_LEN];
    out[..64].copy_from_slice(&signature.to_bytes());
    out[64] = recovery_id.to_byte();
    Ok(out)
}

/// Signs arbitrary bytes under the native scheme (blake2b-256 prehash).
pub fn sign_secp256k1(private_key: &[u8], data: &[u8]) -> Result<[u8; SIGNATURE_LEN], SigningError> {
    sign_digest(private_key, &blake2b_256(data))
}

/// Signs an RLP preimage under the delegated scheme (keccak256 prehash).
pub fn sign_delegated(private_key: &[u8], preimage: &[u8]) -> Result<[u8; SIGNATURE_LEN], SigningError> {
    sign_digest(private_key, &Keccak256::digest(preimage))
}

fn recover_pubkey(digest: &[u8], signature: &[u8]) -> Result<Vec<u8>, SigningError> {
    if signature.len() != SIGNATURE_LEN {
        return Err(SigningError::BadSignature);
    }
    let sig = Signature::from_slice(&signature[..64]).map_err(|_| SigningError::BadSignature)?;
    let recovery_id =
        RecoveryId::from_byte(signature[64]).ok_or(SigningError::BadSignature)?;
    let key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
        .map_err(|_| SigningError::RecoveryFailed)?;
    Ok(key.to_encoded_point(false).as_bytes().to_vec())
}

/// Recovers the native signer address from a signature over `data`.
pub fn recover_secp256k1_signer(data: &[u8], signature: &[u8]) -> Result<Address, SigningError> {
    let pubkey = recover_pubkey(&blake2b_256(data), signature)?;
    Ok(Address::new_secp256k1(&pubkey))
}

/// Uncompressed public key for a private key.
pub fn public_key(private_key: &[u8]) -> Result<Vec<u8>, SigningError> {
    let key = signing_key(private_key)?;
    Ok(key
        .verifying_key()
        .to_encoded_point(false)
        .as_bytes()
        .to_vec())
}

/// Native (`f1`) address for a private key.
pub fn secp256k1_address(private_key: &[u8]) -> Result<Address, SigningError> {
    Ok(Address::new_secp256k1(&public_key(private_key)?))
}

/// 20-byte eth address for a private key: `keccak256(pubkey[1..])[12..]`.
pub fn eth_address(private_key: &[u8]) -> Result<[u8; 20], SigningError> {
    let pubkey = public_key(private_key)?;
    let digest = Keccak256::digest(&pubkey[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[12..]);
    Ok(out)
}

/// Delegated (`f4`) address for a private key.
pub fn delegated_address(private_key: &[u8]) -> Result<Address, SigningError> {
    Ok(Address::new_delegated(
        crate::address::EAM_NAMESPACE,
        &eth_address(private_key)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(fill: u8) -> Vec<u8> {
        let mut key = vec![fill; 32];
        key[0] = 0x01;
        key
    }

    #[test]
    fn sign_then_recover_reproduces_the_sender() {
        let key = test_key(0x22);
        let sender = secp256k1_address(&key).expect("address");
        let data = b"message cid bytes";
        let sig = sign_secp256k1(&key, data).expect("sign");
        let recovered = recover_secp256k1_signer(data, &sig).expect("recover");
        assert_eq!(recovered, sender);
    }

    #[test]
    fn corrupted_signature_recovers_a_different_signer() {
        let key = test_key(0x33);
        let sender = secp256k1_address(&key).expect("address");
        let data = b"payload";
        let mut sig = sign_secp256k1(&key, data).expect("sign");
        sig[10] ^= 0xff;
        match recover_secp256k1_signer(data, &sig) {
            Ok(recovered) => assert_ne!(recovered, sender),
            Err(_) => {}
        }
    }

    #[test]
    fn delegated_and_native_schemes_differ() {
        let key = test_key(0x44);
        let data = b"same preimage";
        let native = sign_secp256k1(&key, data).expect("native");
        let delegated = sign_delegated(&key, data).expect("delegated");
        assert_ne!(native[..64], delegated[..64]);
    }

    #[test]
    fn key_length_is_enforced() {
        assert!(matches!(
            sign_secp256k1(&[0u8; 31], b"x"),
            Err(SigningError::BadKeyLength(31))
        ));
    }

    #[test]
    fn eth_address_is_deterministic() {
        let key = test_key(0x55);
        assert_eq!(eth_address(&key).unwrap(), eth_address(&key).unwrap());
        let delegated = delegated_address(&key).unwrap();
        assert_eq!(
            delegated.delegated_subaddress().unwrap(),
            &eth_address(&key).unwrap()[..]
        );
    }
}
