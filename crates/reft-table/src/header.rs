//! The fixed 24-byte file header.
//!
//! ```text
//! [4 bytes: signature "REFT"]
//! [1 byte:  version = 1]
//! [3 bytes: block size (big-endian)]
//! [8 bytes: min update index (big-endian)]
//! [8 bytes: max update index (big-endian)]
//! ```
//!
//! The header is the first 24 bytes of block 0, not a separate section.

use serde::{Deserialize, Serialize};

use crate::error::{ReftableError, ReftableResult};
use crate::fixed::{decode_u24_be, encode_u24_be, MAX_U24};

/// ASCII "REFT" read as a big-endian u32.
pub const REFTABLE_SIGNATURE: u32 = 0x5245_4654;

pub const REFTABLE_VERSION: u8 = 1;

pub const HEADER_SIZE: usize = 24;

/// Largest block size the 24-bit header field can describe.
pub const MAX_BLOCK_SIZE: u32 = MAX_U24;

/// Decoded file header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub block_size: u32,
    pub min_update_index: u64,
    pub max_update_index: u64,
}

impl Header {
    /// Build a header, checking the block size fits the format.
    pub fn new(
        block_size: u32,
        min_update_index: u64,
        max_update_index: u64,
    ) -> ReftableResult<Self> {
        if block_size == 0 || block_size > MAX_BLOCK_SIZE {
            return Err(ReftableError::InvalidConfig(format!(
                "block size {block_size} outside 1..={MAX_BLOCK_SIZE}"
            )));
        }
        if min_update_index > max_update_index {
            return Err(ReftableError::InvalidConfig(format!(
                "min update index {min_update_index} exceeds max {max_update_index}"
            )));
        }
        Ok(Self {
            block_size,
            min_update_index,
            max_update_index,
        })
    }

    /// Serialize to the on-disk layout.
    pub fn encode(&self) -> ReftableResult<[u8; HEADER_SIZE]> {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&REFTABLE_SIGNATURE.to_be_bytes());
        buf[4] = REFTABLE_VERSION;
        encode_u24_be(self.block_size, &mut buf[5..8])?;
        buf[8..16].copy_from_slice(&self.min_update_index.to_be_bytes());
        buf[16..24].copy_from_slice(&self.max_update_index.to_be_bytes());
        Ok(buf)
    }

    /// Parse and validate the first [`HEADER_SIZE`] bytes of `buf`.
    pub fn decode(buf: &[u8]) -> ReftableResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(corrupt(format!(
                "need {HEADER_SIZE} bytes, got {}",
                buf.len()
            )));
        }

        let signature = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if signature != REFTABLE_SIGNATURE {
            return Err(corrupt(format!(
                "invalid signature 0x{signature:08x}, expected 0x{REFTABLE_SIGNATURE:08x}"
            )));
        }

        let version = buf[4];
        if version != REFTABLE_VERSION {
            return Err(corrupt(format!(
                "unsupported version {version}, expected {REFTABLE_VERSION}"
            )));
        }

        let block_size = decode_u24_be(&buf[5..8])?;
        if block_size == 0 {
            return Err(corrupt("block size is zero"));
        }

        let mut word = [0u8; 8];
        word.copy_from_slice(&buf[8..16]);
        let min_update_index = u64::from_be_bytes(word);
        word.copy_from_slice(&buf[16..24]);
        let max_update_index = u64::from_be_bytes(word);
        if min_update_index > max_update_index {
            return Err(corrupt(format!(
                "min update index {min_update_index} exceeds max {max_update_index}"
            )));
        }

        Ok(Self {
            block_size,
            min_update_index,
            max_update_index,
        })
    }
}

fn corrupt(reason: impl Into<String>) -> ReftableError {
    ReftableError::CorruptHeader {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_bit_exact() {
        let header = Header::new(16384, 1, 0x0102).unwrap();
        let bytes = header.encode().unwrap();
        assert_eq!(&bytes[0..4], b"REFT");
        assert_eq!(bytes[4], 1);
        assert_eq!(&bytes[5..8], &[0x00, 0x40, 0x00]);
        assert_eq!(&bytes[8..16], &1u64.to_be_bytes());
        assert_eq!(&bytes[16..24], &0x0102u64.to_be_bytes());
    }

    #[test]
    fn encode_decode() {
        let header = Header::new(MAX_BLOCK_SIZE, 5, 9).unwrap();
        let decoded = Header::decode(&header.encode().unwrap()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn decode_ignores_trailing_bytes() {
        let mut bytes = Header::new(4096, 0, 0).unwrap().encode().unwrap().to_vec();
        bytes.extend_from_slice(b"r\0\0\0");
        assert_eq!(Header::decode(&bytes).unwrap().block_size, 4096);
    }

    #[test]
    fn rejects_bad_signature() {
        let mut bytes = Header::new(4096, 0, 0).unwrap().encode().unwrap();
        bytes[0..4].copy_from_slice(b"REFX");
        let err = Header::decode(&bytes).unwrap_err();
        assert!(matches!(err, ReftableError::CorruptHeader { .. }));
    }

    #[test]
    fn rejects_bad_version() {
        let mut bytes = Header::new(4096, 0, 0).unwrap().encode().unwrap();
        bytes[4] = 2;
        let err = Header::decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("unsupported version 2"));
    }

    #[test]
    fn rejects_zero_block_size() {
        let mut bytes = Header::new(4096, 0, 0).unwrap().encode().unwrap();
        bytes[5..8].copy_from_slice(&[0, 0, 0]);
        assert!(matches!(
            Header::decode(&bytes),
            Err(ReftableError::CorruptHeader { .. })
        ));
    }

    #[test]
    fn rejects_inverted_update_range() {
        let mut bytes = Header::new(4096, 0, 0).unwrap().encode().unwrap();
        bytes[8..16].copy_from_slice(&10u64.to_be_bytes());
        assert!(Header::decode(&bytes).is_err());
        assert!(Header::new(4096, 10, 1).is_err());
    }

    #[test]
    fn rejects_truncated_header() {
        let err = Header::decode(b"REFT\x01").unwrap_err();
        assert!(matches!(err, ReftableError::CorruptHeader { .. }));
    }

    #[test]
    fn new_rejects_out_of_range_block_size() {
        assert!(Header::new(0, 0, 0).is_err());
        assert!(Header::new(MAX_BLOCK_SIZE + 1, 0, 0).is_err());
    }
}
