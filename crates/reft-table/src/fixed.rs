//! Big-endian fixed-width integers used for block framing.

use crate::error::EncodingError;

/// Largest value a 24-bit field can hold.
pub const MAX_U24: u32 = 0x00ff_ffff;

fn ensure_len(buf: &[u8], needed: usize) -> Result<(), EncodingError> {
    if buf.len() < needed {
        return Err(EncodingError::BufferTooShort {
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

/// Write `value` into the first two bytes of `buf`.
pub fn encode_u16_be(value: u16, buf: &mut [u8]) -> Result<usize, EncodingError> {
    ensure_len(buf, 2)?;
    buf[..2].copy_from_slice(&value.to_be_bytes());
    Ok(2)
}

/// Read a 16-bit value from the first two bytes of `buf`.
pub fn decode_u16_be(buf: &[u8]) -> Result<u16, EncodingError> {
    ensure_len(buf, 2)?;
    Ok(u16::from_be_bytes([buf[0], buf[1]]))
}

/// Write the low 24 bits of `value` into the first three bytes of `buf`.
///
/// Fails if `value` does not fit in 24 bits.
pub fn encode_u24_be(value: u32, buf: &mut [u8]) -> Result<usize, EncodingError> {
    if value > MAX_U24 {
        return Err(EncodingError::ValueTooLarge {
            value: u64::from(value),
            bits: 24,
        });
    }
    ensure_len(buf, 3)?;
    buf[..3].copy_from_slice(&value.to_be_bytes()[1..]);
    Ok(3)
}

/// Read a 24-bit value from the first three bytes of `buf`.
pub fn decode_u24_be(buf: &[u8]) -> Result<u32, EncodingError> {
    ensure_len(buf, 3)?;
    Ok(u32::from_be_bytes([0, buf[0], buf[1], buf[2]]))
}

/// Append a 24-bit value to `out`.
pub(crate) fn push_u24_be(value: u32, out: &mut Vec<u8>) -> Result<(), EncodingError> {
    let mut field = [0u8; 3];
    encode_u24_be(value, &mut field)?;
    out.extend_from_slice(&field);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u16_is_big_endian() {
        let mut buf = [0u8; 4];
        assert_eq!(encode_u16_be(0x1234, &mut buf).unwrap(), 2);
        assert_eq!(buf, [0x12, 0x34, 0, 0]);
        assert_eq!(decode_u16_be(&buf).unwrap(), 0x1234);
    }

    #[test]
    fn u24_is_big_endian() {
        let mut buf = [0u8; 3];
        encode_u24_be(0x00ab_cdef, &mut buf).unwrap();
        assert_eq!(buf, [0xab, 0xcd, 0xef]);
        assert_eq!(decode_u24_be(&buf).unwrap(), 0x00ab_cdef);
    }

    #[test]
    fn u24_max_fits() {
        let mut buf = [0u8; 3];
        encode_u24_be(MAX_U24, &mut buf).unwrap();
        assert_eq!(buf, [0xff; 3]);
        assert_eq!(decode_u24_be(&buf).unwrap(), MAX_U24);
    }

    #[test]
    fn u24_rejects_large_values() {
        let mut buf = [0u8; 3];
        let err = encode_u24_be(MAX_U24 + 1, &mut buf).unwrap_err();
        assert_eq!(
            err,
            EncodingError::ValueTooLarge {
                value: 0x0100_0000,
                bits: 24
            }
        );
        assert_eq!(buf, [0u8; 3]);
    }

    #[test]
    fn short_buffers_are_rejected() {
        let mut buf = [0u8; 2];
        assert!(matches!(
            encode_u24_be(1, &mut buf),
            Err(EncodingError::BufferTooShort { needed: 3, available: 2 })
        ));
        assert!(decode_u24_be(&buf).is_err());
        assert!(decode_u16_be(&buf[..1]).is_err());
        assert!(encode_u16_be(1, &mut buf[..1]).is_err());
    }

    #[test]
    fn push_appends_three_bytes() {
        let mut out = vec![b'r'];
        push_u24_be(28, &mut out).unwrap();
        assert_eq!(out, [b'r', 0, 0, 28]);
    }
}
