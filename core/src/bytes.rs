//! Wire-integer and hex helpers.
//!
//! Everything on the wire and in page-file names is big-endian; in-memory
//! layout is native. Conversions happen at the protocol edge and nowhere
//! else.

use crate::error::{CoreError, Result};

/// Read a big-endian u32 from a 4-byte buffer
pub fn read_u32_be(buf: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*buf)
}

/// Write a u32 as 4 big-endian bytes
pub fn write_u32_be(value: u32) -> [u8; 4] {
    value.to_be_bytes()
}

/// Read a big-endian u32 out of a larger slice
pub fn read_u32_be_at(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

/// Read a big-endian u16 out of a larger slice
pub fn read_u16_be_at(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

/// Swap the byte order of a u64 (8-byte wire numerics)
pub fn swap_u64(value: u64) -> u64 {
    value.swap_bytes()
}

/// Decode a hex string into `out`, case-insensitive.
/// The input must decode to exactly `out.len()` bytes.
pub fn hex2bin(input: &str, out: &mut [u8]) -> Result<()> {
    let decoded = hex::decode(input.trim())?;
    if decoded.len() != out.len() {
        return Err(CoreError::HexLength {
            expected: out.len(),
            actual: decoded.len(),
        });
    }
    out.copy_from_slice(&decoded);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u32_round_trip() {
        for x in [0u32, 1, 0xDEAD_BEEF, u32::MAX, 0x0102_0304] {
            assert_eq!(read_u32_be(&write_u32_be(x)), x);
        }
    }

    #[test]
    fn test_u32_byte_order() {
        assert_eq!(write_u32_be(0x0102_0304), [1, 2, 3, 4]);
        assert_eq!(read_u32_be(&[0, 0, 1, 0]), 256);
    }

    #[test]
    fn test_read_at_offsets() {
        let buf = [0xFF, 0x01, 0x02, 0x03, 0x04, 0xAB, 0xCD];
        assert_eq!(read_u32_be_at(&buf, 1), 0x0102_0304);
        assert_eq!(read_u16_be_at(&buf, 5), 0xABCD);
    }

    #[test]
    fn test_swap_u64() {
        assert_eq!(swap_u64(0x0102_0304_0506_0708), 0x0807_0605_0403_0201);
        assert_eq!(swap_u64(swap_u64(0xDEAD_BEEF_CAFE_F00D)), 0xDEAD_BEEF_CAFE_F00D);
    }

    #[test]
    fn test_hex2bin_case_insensitive() {
        let mut out = [0u8; 4];
        hex2bin("DeadBEEF", &mut out).unwrap();
        assert_eq!(out, [0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_hex2bin_length_mismatch() {
        let mut out = [0u8; 4];
        assert!(hex2bin("deadbe", &mut out).is_err());
        assert!(hex2bin("zzzzzzzz", &mut out).is_err());
    }
}
