//! Minimal dag-CBOR primitives: a major-type header writer and a cursor
//! reader for the handful of shapes the driver decodes (receipt returns,
//! round-trip checks). The protocol fuzzer builds its malformed payloads
//! directly on the writer half.

use thiserror::Error;

pub const MAJ_UNSIGNED: u8 = 0;
pub const MAJ_NEGATIVE: u8 = 1;
pub const MAJ_BYTES: u8 = 2;
pub const MAJ_TEXT: u8 = 3;
pub const MAJ_ARRAY: u8 = 4;
pub const MAJ_MAP: u8 = 5;
pub const MAJ_TAG: u8 = 6;
pub const MAJ_OTHER: u8 = 7;

const NULL_BYTE: u8 = 0xf6;
const TRUE_BYTE: u8 = 0xf5;
const FALSE_BYTE: u8 = 0xf4;

/// Writes a canonical CBOR header for `major` with argument `value`.
pub fn write_header(buf: &mut Vec<u8>, major: u8, value: u64) {
    let high = major << 5;
    if value < 24 {
        buf.push(high | value as u8);
    } else if value <= u8::MAX as u64 {
        buf.push(high | 24);
        buf.push(value as u8);
    } else if value <= u16::MAX as u64 {
        buf.push(high | 25);
        buf.extend_from_slice(&(value as u16).to_be_bytes());
    } else if value <= u32::MAX as u64 {
        buf.push(high | 26);
        buf.extend_from_slice(&(value as u32).to_be_bytes());
    } else {
        buf.push(high | 27);
        buf.extend_from_slice(&value.to_be_bytes());
    }
}

pub fn uint(value: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(9);
    write_header(&mut buf, MAJ_UNSIGNED, value);
    buf
}

pub fn int(value: i64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(9);
    if value >= 0 {
        write_header(&mut buf, MAJ_UNSIGNED, value as u64);
    } else {
        write_header(&mut buf, MAJ_NEGATIVE, (-(value + 1)) as u64);
    }
    buf
}

pub fn bytes(data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(data.len() + 9);
    write_header(&mut buf, MAJ_BYTES, data.len() as u64);
    buf.extend_from_slice(data);
    buf
}

pub fn text(s: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(s.len() + 9);
    write_header(&mut buf, MAJ_TEXT, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
    buf
}

/// Array of pre-encoded elements.
pub fn array(elements: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::new();
    write_header(&mut buf, MAJ_ARRAY, elements.len() as u64);
    for element in elements {
        buf.extend_from_slice(element);
    }
    buf
}

pub fn null() -> Vec<u8> {
    vec![NULL_BYTE]
}

pub fn boolean(value: bool) -> Vec<u8> {
    vec![if value { TRUE_BYTE } else { FALSE_BYTE }]
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CborError {
    #[error("unexpected end of input at offset {0}")]
    Truncated(usize),
    #[error("unexpected major type {found} at offset {at} (wanted {wanted})")]
    WrongType { at: usize, found: u8, wanted: u8 },
    #[error("indefinite-length items are not supported")]
    Indefinite,
    #[error("invalid utf-8 in text string")]
    InvalidText,
    #[error("unexpected tuple length {0}")]
    TupleLength(u64),
}

/// Cursor-style reader over a CBOR byte stream.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CborError> {
        if self.remaining() < n {
            return Err(CborError::Truncated(self.pos));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Current byte offset into the stream.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Reads one header, returning `(major, argument)`.
    pub fn header(&mut self) -> Result<(u8, u64), CborError> {
        let first = self.take(1)?[0];
        let major = first >> 5;
        let info = first & 0x1f;
        let value = match info {
            0..=23 => info as u64,
            24 => self.take(1)?[0] as u64,
            25 => u16::from_be_bytes(self.take(2)?.try_into().unwrap()) as u64,
            26 => u32::from_be_bytes(self.take(4)?.try_into().unwrap()) as u64,
            27 => u64::from_be_bytes(self.take(8)?.try_into().unwrap()),
            _ => return Err(CborError::Indefinite),
        };
        Ok((major, value))
    }

    /// Skips one complete value, descending into containers.
    pub fn skip_value(&mut self) -> Result<(), CborError> {
        let (major, value) = self.header()?;
        match major {
            MAJ_UNSIGNED | MAJ_NEGATIVE | MAJ_OTHER => Ok(()),
            MAJ_BYTES | MAJ_TEXT => self.take(value as usize).map(|_| ()),
            MAJ_ARRAY => {
                for _ in 0..value {
                    self.skip_value()?;
                }
                Ok(())
            }
            MAJ_MAP => {
                for _ in 0..(value * 2) {
                    self.skip_value()?;
                }
                Ok(())
            }
            MAJ_TAG => self.skip_value(),
            _ => unreachable!("major type is three bits"),
        }
    }

    fn expect(&mut self, wanted: u8) -> Result<u64, CborError> {
        let at = self.pos;
        let (major, value) = self.header()?;
        if major != wanted {
            return Err(CborError::WrongType {
                at,
                found: major,
                wanted,
            });
        }
        Ok(value)
    }

    pub fn read_uint(&mut self) -> Result<u64, CborError> {
        self.expect(MAJ_UNSIGNED)
    }

    pub fn read_int(&mut self) -> Result<i64, CborError> {
        let at = self.pos;
        let (major, value) = self.header()?;
        match major {
            MAJ_UNSIGNED => Ok(value as i64),
            MAJ_NEGATIVE => Ok(-(value as i64) - 1),
            _ => Err(CborError::WrongType {
                at,
                found: major,
                wanted: MAJ_UNSIGNED,
            }),
        }
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8], CborError> {
        let len = self.expect(MAJ_BYTES)?;
        self.take(len as usize)
    }

    pub fn read_text(&mut self) -> Result<&'a str, CborError> {
        let len = self.expect(MAJ_TEXT)?;
        std::str::from_utf8(self.take(len as usize)?).map_err(|_| CborError::InvalidText)
    }

    pub fn read_array(&mut self) -> Result<u64, CborError> {
        self.expect(MAJ_ARRAY)
    }

    /// Reads either a null or a byte string. Returns `None` on null.
    pub fn read_optional_bytes(&mut self) -> Result<Option<&'a [u8]>, CborError> {
        if self.peek_null()? {
            self.pos += 1;
            return Ok(None);
        }
        self.read_bytes().map(Some)
    }

    pub fn peek_null(&self) -> Result<bool, CborError> {
        if self.remaining() == 0 {
            return Err(CborError::Truncated(self.pos));
        }
        Ok(self.buf[self.pos] == NULL_BYTE)
    }
}

/// Return payload of the EVM actor manager's `create-external`:
/// a 3-tuple of `[actor_id, robust_address, eth_address]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateExternalReturn {
    pub actor_id: u64,
    pub robust_address: Option<Vec<u8>>,
    pub eth_address: Vec<u8>,
}

impl CreateExternalReturn {
    pub fn decode(data: &[u8]) -> Result<Self, CborError> {
        let mut reader = Reader::new(data);
        let len = reader.read_array()?;
        if len != 3 {
            return Err(CborError::TupleLength(len));
        }
        let actor_id = reader.read_uint()?;
        let robust_address = reader.read_optional_bytes()?.map(|b| b.to_vec());
        let eth_address = reader.read_bytes()?.to_vec();
        Ok(Self {
            actor_id,
            robust_address,
            eth_address,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let robust = match &self.robust_address {
            Some(addr) => bytes(addr),
            None => null(),
        };
        array(&[uint(self.actor_id), robust, bytes(&self.eth_address)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_boundaries_round_trip() {
        for value in [0u64, 23, 24, 255, 256, 65535, 65536, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            write_header(&mut buf, MAJ_UNSIGNED, value);
            let mut reader = Reader::new(&buf);
            assert_eq!(reader.read_uint().unwrap(), value);
            assert_eq!(reader.remaining(), 0);
        }
    }

    #[test]
    fn negative_ints_round_trip() {
        for value in [-1i64, -24, -25, -1000, i64::MIN + 1, 0, 42] {
            let encoded = int(value);
            let mut reader = Reader::new(&encoded);
            assert_eq!(reader.read_int().unwrap(), value);
        }
    }

    #[test]
    fn arrays_and_strings_round_trip() {
        let encoded = array(&[uint(7), text("hello"), bytes(&[1, 2, 3]), null()]);
        let mut reader = Reader::new(&encoded);
        assert_eq!(reader.read_array().unwrap(), 4);
        assert_eq!(reader.read_uint().unwrap(), 7);
        assert_eq!(reader.read_text().unwrap(), "hello");
        assert_eq!(reader.read_bytes().unwrap(), &[1, 2, 3]);
        assert!(reader.peek_null().unwrap());
    }

    #[test]
    fn truncated_input_is_detected() {
        let encoded = bytes(&[0xaa; 16]);
        let mut reader = Reader::new(&encoded[..8]);
        assert!(matches!(
            reader.read_bytes(),
            Err(CborError::Truncated(_))
        ));
    }

    #[test]
    fn create_external_return_round_trips() {
        let ret = CreateExternalReturn {
            actor_id: 1234,
            robust_address: Some(vec![0x02, 0xde, 0xad]),
            eth_address: vec![0x11; 20],
        };
        assert_eq!(CreateExternalReturn::decode(&ret.encode()).unwrap(), ret);

        let no_robust = CreateExternalReturn {
            actor_id: 9,
            robust_address: None,
            eth_address: vec![0x22; 20],
        };
        assert_eq!(
            CreateExternalReturn::decode(&no_robust.encode()).unwrap(),
            no_robust
        );
    }
}
