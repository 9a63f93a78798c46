//! Minimal ABI encoding: 4-byte selectors plus 32-byte argument words.

use sha3::{Digest, Keccak256};

use squall_chain_client::cbor;

use super::uint256::U256Word;

/// First four bytes of `keccak256(signature)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

pub fn encode_u64(value: u64) -> [u8; 32] {
    encode_u128(value as u128)
}

pub fn encode_u128(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

pub fn encode_word(value: &U256Word) -> [u8; 32] {
    value.to_be_bytes()
}

/// Right-aligned address word. An empty slice encodes the zero address.
pub fn encode_address(address: &[u8]) -> [u8; 32] {
    let mut word = [0u8; 32];
    let len = address.len().min(32);
    word[32 - len..].copy_from_slice(&address[..len]);
    word
}

pub fn encode_bool(value: bool) -> [u8; 32] {
    let mut word = [0u8; 32];
    if value {
        word[31] = 1;
    }
    word
}

/// Selector followed by the argument words.
pub fn calldata(selector: [u8; 4], words: &[[u8; 32]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + 32 * words.len());
    out.extend_from_slice(&selector);
    for word in words {
        out.extend_from_slice(word);
    }
    out
}

/// Wraps EVM call data in the CBOR byte-string envelope the EVM actor
/// expects as its invocation parameters.
pub fn wrap_calldata(calldata: &[u8]) -> Vec<u8> {
    cbor::bytes(calldata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_matches_known_vectors() {
        // Canonical ERC-20 selectors.
        assert_eq!(selector("totalSupply()"), [0x18, 0x16, 0x0d, 0xdd]);
        assert_eq!(selector("balanceOf(address)"), [0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(
            selector("transfer(address,uint256)"),
            [0xa9, 0x05, 0x9c, 0xbb]
        );
    }

    #[test]
    fn words_are_32_bytes_right_aligned() {
        let word = encode_u64(0x0102);
        assert_eq!(word[30..], [0x01, 0x02]);
        assert!(word[..30].iter().all(|b| *b == 0));

        let addr = encode_address(&[0xaa; 20]);
        assert!(addr[..12].iter().all(|b| *b == 0));
        assert!(addr[12..].iter().all(|b| *b == 0xaa));

        assert_eq!(encode_address(&[]), [0u8; 32]);
        assert_eq!(encode_bool(true)[31], 1);
        assert_eq!(encode_bool(false), [0u8; 32]);
    }

    #[test]
    fn calldata_is_selector_plus_words() {
        let data = calldata(selector("sendCoin(address,uint256)"), &[
            encode_address(&[0x01; 20]),
            encode_u64(8_000),
        ]);
        assert_eq!(data.len(), 4 + 64);
    }

    #[test]
    fn wrapped_calldata_is_a_cbor_byte_string() {
        let data = calldata(selector("destroy()"), &[]);
        let wrapped = wrap_calldata(&data);
        // Major type 2 (byte string), length 4.
        assert_eq!(wrapped[0], 0x44);
        assert_eq!(&wrapped[1..], &data[..]);
    }
}
