//! Variable-length unsigned integers.
//!
//! Seven data bits per byte, most significant group first, continuation bit
//! set on every byte but the last. Each continuation group is biased by one,
//! so every value has exactly one encoding: `127` is `7f`, `128` is `80 00`.

use crate::error::EncodingError;

/// Longest encoding of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

/// Space reserved per varint when bounding a record's size before encoding
/// it. At least [`MAX_VARINT_LEN`].
pub const MAX_VARINT_RESERVATION: usize = 16;

/// Append `value` to `out`. Returns the number of bytes written.
pub fn encode_varint(value: u64, out: &mut Vec<u8>) -> usize {
    let mut scratch = [0u8; MAX_VARINT_LEN];
    let mut pos = scratch.len() - 1;
    scratch[pos] = (value & 0x7f) as u8;

    let mut rest = value >> 7;
    while rest != 0 {
        rest -= 1;
        pos -= 1;
        scratch[pos] = 0x80 | (rest & 0x7f) as u8;
        rest >>= 7;
    }

    out.extend_from_slice(&scratch[pos..]);
    scratch.len() - pos
}

/// Decode a varint from the front of `data`. Returns `(value, bytes_consumed)`.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize), EncodingError> {
    let mut bytes = data.iter().copied();
    let mut byte = bytes.next().ok_or(EncodingError::TruncatedVarint)?;
    let mut value = u64::from(byte & 0x7f);
    let mut consumed = 1;

    while byte & 0x80 != 0 {
        value = value.checked_add(1).ok_or(EncodingError::VarintOverflow)?;
        if value >> (64 - 7) != 0 {
            return Err(EncodingError::VarintOverflow);
        }
        byte = bytes.next().ok_or(EncodingError::TruncatedVarint)?;
        consumed += 1;
        value = (value << 7) | u64::from(byte & 0x7f);
    }

    Ok((value, consumed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encoded(value: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_varint(value, &mut buf);
        buf
    }

    #[test]
    fn single_byte_values() {
        assert_eq!(encoded(0), [0x00]);
        assert_eq!(encoded(1), [0x01]);
        assert_eq!(encoded(127), [0x7f]);
    }

    #[test]
    fn continuation_groups_are_biased() {
        assert_eq!(encoded(128), [0x80, 0x00]);
        assert_eq!(encoded(255), [0x80, 0x7f]);
        assert_eq!(encoded(16383), [0xfe, 0x7f]);
        assert_eq!(encoded(16384), [0xff, 0x00]);
        assert_eq!(encoded(16511), [0xff, 0x7f]);
        assert_eq!(encoded(16512), [0x80, 0x80, 0x00]);
    }

    #[test]
    fn max_u64_takes_ten_bytes() {
        let buf = encoded(u64::MAX);
        assert_eq!(buf.len(), MAX_VARINT_LEN);
        assert_eq!(decode_varint(&buf).unwrap(), (u64::MAX, MAX_VARINT_LEN));
    }

    #[test]
    fn decode_reports_consumed_bytes() {
        let mut buf = encoded(300);
        buf.extend_from_slice(&[0xaa, 0xbb]);
        assert_eq!(decode_varint(&buf).unwrap(), (300, 2));
    }

    #[test]
    fn decode_empty_is_truncated() {
        assert_eq!(decode_varint(&[]), Err(EncodingError::TruncatedVarint));
    }

    #[test]
    fn decode_dangling_continuation_is_truncated() {
        assert_eq!(decode_varint(&[0x80]), Err(EncodingError::TruncatedVarint));
        assert_eq!(decode_varint(&[0xff, 0xff]), Err(EncodingError::TruncatedVarint));
    }

    #[test]
    fn decode_overlong_overflows() {
        let data = [0xff; 12];
        assert_eq!(decode_varint(&data), Err(EncodingError::VarintOverflow));
    }

    proptest! {
        #[test]
        fn decode_consumes_whole_encoding(value in any::<u64>()) {
            let buf = encoded(value);
            prop_assert!(buf.len() <= MAX_VARINT_LEN);
            prop_assert_eq!(decode_varint(&buf).unwrap(), (value, buf.len()));
        }
    }
}
