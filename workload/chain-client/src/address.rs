//! Chain address parsing, formatting, and derivation.
//!
//! Supports the three protocol classes the driver touches: ID addresses
//! (`f0…`), secp256k1 key addresses (`f1…`), and delegated addresses
//! (`f4…`, namespace 10 for EVM actors).

use std::fmt;

use base32::Alphabet;
use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;
use thiserror::Error;

const CHECKSUM_LEN: usize = 4;
const PAYLOAD_HASH_LEN: usize = 20;
const BASE32: Alphabet = Alphabet::Rfc4648Lower { padding: false };

/// Namespace of the EVM actor manager under the delegated protocol.
pub const EAM_NAMESPACE: u64 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address string too short")]
    TooShort,
    #[error("unknown network prefix {0:?}")]
    UnknownNetwork(char),
    #[error("unknown protocol indicator {0:?}")]
    UnknownProtocol(char),
    #[error("invalid payload encoding")]
    InvalidPayload,
    #[error("checksum mismatch")]
    BadChecksum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Id,
    Secp256k1,
    Delegated,
}

impl Protocol {
    fn byte(self) -> u8 {
        match self {
            Protocol::Id => 0,
            Protocol::Secp256k1 => 1,
            Protocol::Delegated => 4,
        }
    }
}

/// A parsed chain address: protocol indicator plus raw payload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    protocol_byte: u8,
    payload: Vec<u8>,
}

impl Address {
    pub fn new_id(id: u64) -> Self {
        Self {
            protocol_byte: Protocol::Id.byte(),
            payload: uvarint_encode(id),
        }
    }

    /// Key address for an uncompressed (65-byte) secp256k1 public key.
    pub fn new_secp256k1(pubkey: &[u8]) -> Self {
        Self {
            protocol_byte: Protocol::Secp256k1.byte(),
            payload: hash_payload(pubkey),
        }
    }

    /// Delegated address: `uvarint(namespace) ++ subaddress`.
    pub fn new_delegated(namespace: u64, subaddress: &[u8]) -> Self {
        let mut payload = uvarint_encode(namespace);
        payload.extend_from_slice(subaddress);
        Self {
            protocol_byte: Protocol::Delegated.byte(),
            payload,
        }
    }

    pub fn protocol(&self) -> Option<Protocol> {
        match self.protocol_byte {
            0 => Some(Protocol::Id),
            1 => Some(Protocol::Secp256k1),
            4 => Some(Protocol::Delegated),
            _ => None,
        }
    }

    /// Raw payload without the protocol indicator.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Wire form: protocol byte followed by payload. This is what goes into
    /// dag-CBOR message fields.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.payload.len());
        out.push(self.protocol_byte);
        out.extend_from_slice(&self.payload);
        out
    }

    /// ID value for `f0` addresses.
    pub fn id(&self) -> Option<u64> {
        if self.protocol_byte != 0 {
            return None;
        }
        uvarint_decode(&self.payload).map(|(id, _)| id)
    }

    /// Delegated subaddress (the 20-byte eth address for namespace 10).
    pub fn delegated_subaddress(&self) -> Option<&[u8]> {
        if self.protocol_byte != 4 {
            return None;
        }
        let (_, consumed) = uvarint_decode(&self.payload)?;
        Some(&self.payload[consumed..])
    }

    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let mut chars = s.chars();
        let network = chars.next().ok_or(AddressError::TooShort)?;
        if network != 'f' && network != 't' {
            return Err(AddressError::UnknownNetwork(network));
        }
        let protocol = chars.next().ok_or(AddressError::TooShort)?;
        let rest = &s[2..];
        match protocol {
            '0' => {
                let id: u64 = rest.parse().map_err(|_| AddressError::InvalidPayload)?;
                Ok(Self::new_id(id))
            }
            '1' => {
                let payload = decode_checked(1, rest)?;
                if payload.len() != PAYLOAD_HASH_LEN {
                    return Err(AddressError::InvalidPayload);
                }
                Ok(Self {
                    protocol_byte: 1,
                    payload,
                })
            }
            '4' => {
                // f4<namespace>f<base32-subaddress-and-checksum>
                let sep = rest.find('f').ok_or(AddressError::InvalidPayload)?;
                let namespace: u64 = rest[..sep]
                    .parse()
                    .map_err(|_| AddressError::InvalidPayload)?;
                let mut payload = uvarint_encode(namespace);
                let sub = decode_checked_delegated(namespace, &rest[sep + 1..])?;
                payload.extend_from_slice(&sub);
                Ok(Self {
                    protocol_byte: 4,
                    payload,
                })
            }
            other => Err(AddressError::UnknownProtocol(other)),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.protocol_byte {
            0 => {
                let id = uvarint_decode(&self.payload).map(|(v, _)| v).unwrap_or(0);
                write!(f, "f0{id}")
            }
            4 => {
                let (namespace, consumed) =
                    uvarint_decode(&self.payload).unwrap_or((0, self.payload.len()));
                let sub = &self.payload[consumed..];
                let mut checked = sub.to_vec();
                checked.extend_from_slice(&checksum(self.protocol_byte, &self.payload));
                write!(f, "f4{namespace}f{}", base32::encode(BASE32, &checked))
            }
            proto => {
                let mut checked = self.payload.clone();
                checked.extend_from_slice(&checksum(proto, &self.payload));
                write!(f, "f{proto}{}", base32::encode(BASE32, &checked))
            }
        }
    }
}

fn decode_checked(protocol: u8, encoded: &str) -> Result<Vec<u8>, AddressError> {
    let raw = base32::decode(BASE32, encoded).ok_or(AddressError::InvalidPayload)?;
    if raw.len() < CHECKSUM_LEN {
        return Err(AddressError::InvalidPayload);
    }
    let (payload, check) = raw.split_at(raw.len() - CHECKSUM_LEN);
    if checksum(protocol, payload) != check {
        return Err(AddressError::BadChecksum);
    }
    Ok(payload.to_vec())
}

fn decode_checked_delegated(namespace: u64, encoded: &str) -> Result<Vec<u8>, AddressError> {
    let raw = base32::decode(BASE32, encoded).ok_or(AddressError::InvalidPayload)?;
    if raw.len() < CHECKSUM_LEN {
        return Err(AddressError::InvalidPayload);
    }
    let (sub, check) = raw.split_at(raw.len() - CHECKSUM_LEN);
    // The checksum covers protocol byte + full payload, namespace included.
    let mut payload = uvarint_encode(namespace);
    payload.extend_from_slice(sub);
    if checksum(4, &payload) != check {
        return Err(AddressError::BadChecksum);
    }
    Ok(sub.to_vec())
}

/// 4-byte blake2b over `protocol_byte ++ payload`.
fn checksum(protocol: u8, payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut hasher = Blake2bVar::new(CHECKSUM_LEN).expect("checksum digest size");
    hasher.update(&[protocol]);
    hasher.update(payload);
    let mut out = [0u8; CHECKSUM_LEN];
    hasher.finalize_variable(&mut out).expect("checksum output");
    out
}

/// 20-byte blake2b payload hash over key material.
fn hash_payload(data: &[u8]) -> Vec<u8> {
    let mut hasher = Blake2bVar::new(PAYLOAD_HASH_LEN).expect("payload digest size");
    hasher.update(data);
    let mut out = vec![0u8; PAYLOAD_HASH_LEN];
    hasher.finalize_variable(&mut out).expect("payload output");
    out
}

pub(crate) fn uvarint_encode(mut value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

pub(crate) fn uvarint_decode(buf: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0u64;
    for (i, byte) in buf.iter().enumerate() {
        value |= ((byte & 0x7f) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
        if i >= 9 {
            return None;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_addresses_round_trip() {
        for id in [0u64, 1, 100, 1000, 1001, u32::MAX as u64] {
            let addr = Address::new_id(id);
            let parsed = Address::parse(&addr.to_string()).expect("parse");
            assert_eq!(parsed, addr);
            assert_eq!(parsed.id(), Some(id));
        }
        assert_eq!(Address::new_id(1000).to_string(), "f01000");
    }

    #[test]
    fn secp_addresses_round_trip() {
        let pubkey = [0x04u8; 65];
        let addr = Address::new_secp256k1(&pubkey);
        assert_eq!(addr.payload().len(), 20);
        let formatted = addr.to_string();
        assert!(formatted.starts_with("f1"));
        assert_eq!(Address::parse(&formatted).expect("parse"), addr);
    }

    #[test]
    fn delegated_addresses_round_trip() {
        let eth = [0xabu8; 20];
        let addr = Address::new_delegated(EAM_NAMESPACE, &eth);
        let formatted = addr.to_string();
        assert!(formatted.starts_with("f410"));
        let parsed = Address::parse(&formatted).expect("parse");
        assert_eq!(parsed, addr);
        assert_eq!(parsed.delegated_subaddress(), Some(&eth[..]));
    }

    #[test]
    fn testnet_prefix_is_accepted() {
        let addr = Address::new_secp256k1(&[0x04u8; 65]);
        let testnet = format!("t{}", &addr.to_string()[1..]);
        assert_eq!(Address::parse(&testnet).expect("parse"), addr);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let addr = Address::new_secp256k1(&[0x07u8; 65]);
        let mut s = addr.to_string();
        // Flip the final base32 character to break the checksum.
        let last = s.pop().unwrap();
        s.push(if last == 'a' { 'b' } else { 'a' });
        assert_eq!(Address::parse(&s), Err(AddressError::BadChecksum));
    }

    #[test]
    fn wire_bytes_carry_the_protocol_indicator() {
        let addr = Address::new_id(1000);
        let bytes = addr.to_bytes();
        assert_eq!(bytes[0], 0);
        assert_eq!(bytes[1..], [0xe8, 0x07]);
    }

    #[test]
    fn uvarint_round_trips() {
        for value in [0u64, 1, 127, 128, 300, 1000, u64::MAX] {
            let encoded = uvarint_encode(value);
            let (decoded, used) = uvarint_decode(&encoded).expect("decode");
            assert_eq!(decoded, value);
            assert_eq!(used, encoded.len());
        }
    }
}
