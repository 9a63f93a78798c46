//! Typed EIP-1559 transaction with RLP encoding for the delegated signing
//! path. The unsigned preimage and the signed wire form both carry the
//! `0x02` transaction-type prefix.

use alloy_rlp::{length_of_length, BufMut, Encodable, Header};

use squall_chain_client::signing::SIGNATURE_LEN;

pub const ETH_CHAIN_ID: u64 = 31_415_926;
pub const ETH_GAS_LIMIT: u64 = 3_000_000;
/// 1 nano in the chain's smallest unit.
pub const ETH_MAX_FEE_PER_GAS: u128 = 1_000_000_000;

const TX_TYPE_EIP1559: u8 = 0x02;
// An empty access list encodes as a zero-length RLP list.
const EMPTY_ACCESS_LIST_LEN: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip1559Tx {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: u128,
    pub max_fee_per_gas: u128,
    pub gas_limit: u64,
    pub to: [u8; 20],
    pub value: u128,
    pub input: Vec<u8>,
}

impl Eip1559Tx {
    fn fields_length(&self) -> usize {
        self.chain_id.length()
            + self.nonce.length()
            + self.max_priority_fee_per_gas.length()
            + self.max_fee_per_gas.length()
            + self.gas_limit.length()
            + self.to.as_slice().length()
            + self.value.length()
            + self.input.as_slice().length()
            + EMPTY_ACCESS_LIST_LEN
    }

    fn encode_fields(&self, out: &mut dyn BufMut) {
        self.chain_id.encode(out);
        self.nonce.encode(out);
        self.max_priority_fee_per_gas.encode(out);
        self.max_fee_per_gas.encode(out);
        self.gas_limit.encode(out);
        self.to.as_slice().encode(out);
        self.value.encode(out);
        self.input.as_slice().encode(out);
        Header {
            list: true,
            payload_length: 0,
        }
        .encode(out);
    }

    /// Signing preimage: `0x02 || rlp(unsigned fields)`.
    pub fn unsigned_preimage(&self) -> Vec<u8> {
        let payload_length = self.fields_length();
        let mut out = Vec::with_capacity(1 + payload_length + length_of_length(payload_length));
        out.push(TX_TYPE_EIP1559);
        Header {
            list: true,
            payload_length,
        }
        .encode(&mut out);
        self.encode_fields(&mut out);
        out
    }

    /// Wire form with the signature appended:
    /// `0x02 || rlp(fields || y_parity || r || s)`.
    pub fn signed_raw(&self, signature: &[u8; SIGNATURE_LEN]) -> Vec<u8> {
        let y_parity = signature[64];
        let r = trim_leading_zeros(&signature[..32]);
        let s = trim_leading_zeros(&signature[32..64]);

        let payload_length =
            self.fields_length() + y_parity.length() + r.length() + s.length();
        let mut out = Vec::with_capacity(1 + payload_length + length_of_length(payload_length));
        out.push(TX_TYPE_EIP1559);
        Header {
            list: true,
            payload_length,
        }
        .encode(&mut out);
        self.encode_fields(&mut out);
        y_parity.encode(&mut out);
        r.encode(&mut out);
        s.encode(&mut out);
        out
    }
}

/// RLP integers are minimal big-endian byte strings.
fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Eip1559Tx {
        Eip1559Tx {
            chain_id: ETH_CHAIN_ID,
            nonce: 5,
            max_priority_fee_per_gas: 0,
            max_fee_per_gas: ETH_MAX_FEE_PER_GAS,
            gas_limit: ETH_GAS_LIMIT,
            to: [0xab; 20],
            value: 0,
            input: vec![0xa9, 0x05, 0x9c, 0xbb],
        }
    }

    #[test]
    fn preimage_is_typed_and_deterministic() {
        let tx = sample();
        let preimage = tx.unsigned_preimage();
        assert_eq!(preimage[0], TX_TYPE_EIP1559);
        assert_eq!(preimage, sample().unsigned_preimage());
    }

    #[test]
    fn signed_form_extends_the_unsigned_fields() {
        let tx = sample();
        let mut signature = [0u8; SIGNATURE_LEN];
        signature[..32].copy_from_slice(&[0x11; 32]);
        signature[32..64].copy_from_slice(&[0x22; 32]);
        signature[64] = 1;

        let raw = tx.signed_raw(&signature);
        assert_eq!(raw[0], TX_TYPE_EIP1559);
        assert!(raw.len() > tx.unsigned_preimage().len());
        // r and s appear as 32-byte strings near the tail.
        let tail = &raw[raw.len() - 66..];
        assert_eq!(tail[0], 0x80 + 32);
        assert!(tail[1..33].iter().all(|b| *b == 0x11));
        assert_eq!(tail[33], 0x80 + 32);
        assert!(tail[34..].iter().all(|b| *b == 0x22));
    }

    #[test]
    fn zero_signature_components_trim_to_empty() {
        assert_eq!(trim_leading_zeros(&[0, 0, 0]), &[] as &[u8]);
        assert_eq!(trim_leading_zeros(&[0, 1, 2]), &[1, 2]);
        assert_eq!(trim_leading_zeros(&[9]), &[9]);
    }

    #[test]
    fn nonce_changes_the_preimage() {
        let mut other = sample();
        other.nonce += 1;
        assert_ne!(sample().unsigned_preimage(), other.unsigned_preimage());
    }
}
