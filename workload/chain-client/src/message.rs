//! Native chain message: dag-CBOR tuple encoding and CID computation.

use std::fmt;

use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;

use crate::address::{uvarint_encode, Address};
use crate::cbor;

const DAG_CBOR_CODEC: u64 = 0x71;
const BLAKE2B_256_CODE: u64 = 0xb220;

/// Non-negative token quantity in the chain's smallest unit.
///
/// JSON form is a decimal string; CBOR form is the chain's BigInt layout,
/// a sign byte (0x00 = positive) followed by trimmed big-endian magnitude,
/// empty for zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct TokenAmount(pub u128);

impl TokenAmount {
    pub fn zero() -> Self {
        Self(0)
    }

    pub fn to_cbor_bytes(self) -> Vec<u8> {
        if self.0 == 0 {
            return Vec::new();
        }
        let raw = self.0.to_be_bytes();
        let start = raw.iter().position(|b| *b != 0).unwrap_or(raw.len() - 1);
        let mut out = Vec::with_capacity(1 + raw.len() - start);
        out.push(0x00);
        out.extend_from_slice(&raw[start..]);
        out
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unsigned chain message. Field order matches the wire tuple:
/// `[Version, To, From, Nonce, Value, GasLimit, GasFeeCap, GasPremium,
///   Method, Params]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub version: u64,
    pub to: Address,
    pub from: Address,
    pub nonce: u64,
    pub value: TokenAmount,
    pub gas_limit: i64,
    pub gas_fee_cap: TokenAmount,
    pub gas_premium: TokenAmount,
    pub method: u64,
    pub params: Vec<u8>,
}

impl Message {
    pub fn cbor_encode(&self) -> Vec<u8> {
        cbor::array(&[
            cbor::uint(self.version),
            cbor::bytes(&self.to.to_bytes()),
            cbor::bytes(&self.from.to_bytes()),
            cbor::uint(self.nonce),
            cbor::bytes(&self.value.to_cbor_bytes()),
            cbor::int(self.gas_limit),
            cbor::bytes(&self.gas_fee_cap.to_cbor_bytes()),
            cbor::bytes(&self.gas_premium.to_cbor_bytes()),
            cbor::uint(self.method),
            cbor::bytes(&self.params),
        ])
    }

    /// CIDv1 (dag-cbor, blake2b-256) over the tuple encoding. Signatures for
    /// native messages are produced over these bytes.
    pub fn cid_bytes(&self) -> Vec<u8> {
        let digest = blake2b_256(&self.cbor_encode());
        let mut out = Vec::with_capacity(40);
        out.extend_from_slice(&uvarint_encode(1));
        out.extend_from_slice(&uvarint_encode(DAG_CBOR_CODEC));
        out.extend_from_slice(&uvarint_encode(BLAKE2B_256_CODE));
        out.extend_from_slice(&uvarint_encode(digest.len() as u64));
        out.extend_from_slice(&digest);
        out
    }

    /// Multibase base32-lower string form (`b…`) of the message CID.
    pub fn cid_string(&self) -> String {
        format!(
            "b{}",
            base32::encode(
                base32::Alphabet::Rfc4648Lower { padding: false },
                &self.cid_bytes()
            )
        )
    }
}

pub(crate) fn blake2b_256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Blake2bVar::new(32).expect("digest size");
    hasher.update(data);
    let mut out = vec![0u8; 32];
    hasher.finalize_variable(&mut out).expect("digest output");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbor::Reader;

    fn sample() -> Message {
        Message {
            version: 0,
            to: Address::new_id(1001),
            from: Address::new_id(1000),
            nonce: 7,
            value: TokenAmount(42),
            gas_limit: 1_000_000,
            gas_fee_cap: TokenAmount(100_000),
            gas_premium: TokenAmount(1_000),
            method: 0,
            params: Vec::new(),
        }
    }

    #[test]
    fn token_amount_cbor_layout() {
        assert!(TokenAmount::zero().to_cbor_bytes().is_empty());
        assert_eq!(TokenAmount(1).to_cbor_bytes(), vec![0x00, 0x01]);
        assert_eq!(TokenAmount(100_000).to_cbor_bytes(), vec![0x00, 0x01, 0x86, 0xa0]);
    }

    #[test]
    fn encoding_is_a_ten_field_tuple() {
        let encoded = sample().cbor_encode();
        let mut reader = Reader::new(&encoded);
        assert_eq!(reader.read_array().unwrap(), 10);
        assert_eq!(reader.read_uint().unwrap(), 0);
        assert_eq!(reader.read_bytes().unwrap(), &sample().to.to_bytes()[..]);
    }

    #[test]
    fn cid_is_stable_and_nonce_sensitive() {
        let msg = sample();
        assert_eq!(msg.cid_string(), sample().cid_string());
        assert!(msg.cid_string().starts_with('b'));

        let mut bumped = sample();
        bumped.nonce += 1;
        assert_ne!(msg.cid_string(), bumped.cid_string());
    }

    #[test]
    fn cid_bytes_carry_dag_cbor_blake2b_prefix() {
        let cid = sample().cid_bytes();
        // version 1, codec 0x71, multihash code 0xb220 (varint a0 e4 02), length 32
        assert_eq!(cid[0], 0x01);
        assert_eq!(cid[1], 0x71);
        assert_eq!(&cid[2..4], &[0xa0, 0xe4]);
        assert_eq!(cid.len(), 2 + 3 + 1 + 32);
    }
}
