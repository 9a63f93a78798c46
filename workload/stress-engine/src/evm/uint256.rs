//! Fixed-width 256-bit unsigned words for ABI results.
//!
//! Balances and supplies come back as raw 32-byte words. They are compared
//! and summed without narrowing: a wrapped uint256 underflow produces a
//! value far above `u128::MAX`, and catching exactly that case is the point
//! of the underflow guard.

use std::fmt;

/// Big-endian 256-bit word. `Ord` on the byte array is numeric order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct U256Word([u8; 32]);

impl U256Word {
    pub const ZERO: U256Word = U256Word([0u8; 32]);

    pub fn from_u128(value: u128) -> Self {
        let mut out = [0u8; 32];
        out[16..].copy_from_slice(&value.to_be_bytes());
        Self(out)
    }

    /// Takes the trailing 32 bytes of `slice`, zero-padding short input.
    pub fn from_be_slice(slice: &[u8]) -> Self {
        let mut out = [0u8; 32];
        if slice.len() >= 32 {
            out.copy_from_slice(&slice[slice.len() - 32..]);
        } else {
            out[32 - slice.len()..].copy_from_slice(slice);
        }
        Self(out)
    }

    pub fn to_be_bytes(self) -> [u8; 32] {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Low 128 bits, `None` when the high half is populated.
    pub fn to_u128(self) -> Option<u128> {
        if self.0[..16].iter().any(|b| *b != 0) {
            return None;
        }
        Some(u128::from_be_bytes(self.0[16..].try_into().unwrap()))
    }

    /// Wrapping-free addition; `None` on overflow past 256 bits.
    pub fn checked_add(self, other: U256Word) -> Option<U256Word> {
        let mut out = [0u8; 32];
        let mut carry = 0u16;
        for i in (0..32).rev() {
            let sum = self.0[i] as u16 + other.0[i] as u16 + carry;
            out[i] = (sum & 0xff) as u8;
            carry = sum >> 8;
        }
        if carry != 0 {
            return None;
        }
        Some(U256Word(out))
    }

    /// `self - other`; `None` when the result would be negative.
    pub fn checked_sub(self, other: U256Word) -> Option<U256Word> {
        let mut out = [0u8; 32];
        let mut borrow = 0i16;
        for i in (0..32).rev() {
            let diff = self.0[i] as i16 - other.0[i] as i16 - borrow;
            if diff < 0 {
                out[i] = (diff + 256) as u8;
                borrow = 1;
            } else {
                out[i] = diff as u8;
                borrow = 0;
            }
        }
        if borrow != 0 {
            return None;
        }
        Some(U256Word(out))
    }
}

impl fmt::Display for U256Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_u128() {
            Some(value) => write!(f, "{value}"),
            None => write!(f, "0x{}", hex::encode(self.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_numeric() {
        let small = U256Word::from_u128(100);
        let large = U256Word::from_u128(u128::MAX);
        let huge = U256Word::from_be_slice(&[0xff; 32]);
        assert!(small < large);
        assert!(large < huge);
        assert!(huge > small);
    }

    #[test]
    fn add_and_sub_round_trip() {
        let a = U256Word::from_u128(1_000_000_000_000_000_000);
        let b = U256Word::from_u128(5);
        let sum = a.checked_add(b).unwrap();
        assert_eq!(sum.checked_sub(b).unwrap(), a);
        assert_eq!(sum.checked_sub(a).unwrap(), b);
    }

    #[test]
    fn overflow_and_underflow_are_detected() {
        let max = U256Word::from_be_slice(&[0xff; 32]);
        assert!(max.checked_add(U256Word::from_u128(1)).is_none());
        assert!(U256Word::ZERO.checked_sub(U256Word::from_u128(1)).is_none());
    }

    #[test]
    fn narrow_conversion_guards_the_high_half() {
        assert_eq!(U256Word::from_u128(42).to_u128(), Some(42));
        assert_eq!(U256Word::from_be_slice(&[0x01; 32]).to_u128(), None);
    }

    #[test]
    fn from_be_slice_pads_and_truncates() {
        assert_eq!(U256Word::from_be_slice(&[0x01]), U256Word::from_u128(1));
        let long = [vec![0xaau8; 8], vec![0u8; 31], vec![0x07u8]].concat();
        assert_eq!(U256Word::from_be_slice(&long), U256Word::from_u128(7));
    }
}
