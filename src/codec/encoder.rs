//! Spinel datatype encoder.
//!
//! Integers are little-endian, packed unsigned integers use 7-bit groups with
//! the high bit as a continuation marker.
//!
//! # Example
//!
//! ```
//! use ncp_spinel::codec::SpinelEncoder;
//!
//! let mut encoder = SpinelEncoder::new();
//! encoder.write_uint_packed(1337).unwrap();
//! encoder.write_u16(0xABCD);
//!
//! assert_eq!(&encoder.finish()[..], &[0xB9, 0x0A, 0xCD, 0xAB]);
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, SpinelError};
use crate::protocol::MAX_UINT_PACKED;

/// Appends Spinel datatypes to a growable buffer.
#[derive(Debug, Default)]
pub struct SpinelEncoder {
    buf: BytesMut,
    /// Offsets of the length placeholders of open structs.
    structs: Vec<usize>,
}

impl SpinelEncoder {
    /// Create an empty encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an encoder with preallocated space.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            structs: Vec::new(),
        }
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.put_u8(value as u8);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buf.put_i8(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.put_u16_le(value);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.put_i16_le(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.put_i32_le(value);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.put_u64_le(value);
    }

    /// Write a packed unsigned integer (at most 21 bits).
    pub fn write_uint_packed(&mut self, mut value: u32) -> Result<()> {
        if value > MAX_UINT_PACKED {
            return Err(SpinelError::InvalidArgs);
        }
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.put_u8(byte);
                return Ok(());
            }
            self.buf.put_u8(byte | 0x80);
        }
    }

    /// Write an EUI-64 as 8 raw bytes.
    pub fn write_eui64(&mut self, value: &[u8; 8]) {
        self.buf.put_slice(value);
    }

    /// Write a null-terminated UTF-8 string.
    pub fn write_utf8(&mut self, value: &str) -> Result<()> {
        if value.as_bytes().contains(&0) {
            return Err(SpinelError::InvalidArgs);
        }
        self.buf.put_slice(value.as_bytes());
        self.buf.put_u8(0);
        Ok(())
    }

    /// Write raw data with no length prefix.
    pub fn write_data(&mut self, value: &[u8]) {
        self.buf.put_slice(value);
    }

    /// Write data preceded by its u16 length.
    pub fn write_data_wlen(&mut self, value: &[u8]) -> Result<()> {
        let len = u16::try_from(value.len()).map_err(|_| SpinelError::InvalidArgs)?;
        self.buf.put_u16_le(len);
        self.buf.put_slice(value);
        Ok(())
    }

    /// Begin a length-prefixed struct; close it with [`close_struct`](Self::close_struct).
    pub fn open_struct(&mut self) {
        self.structs.push(self.buf.len());
        self.buf.put_u16_le(0);
    }

    /// Finish the innermost open struct, patching its length prefix.
    pub fn close_struct(&mut self) -> Result<()> {
        let start = self.structs.pop().ok_or(SpinelError::InvalidState)?;
        let len = self.buf.len() - start - 2;
        let len = u16::try_from(len).map_err(|_| SpinelError::InvalidArgs)?;
        self.buf[start..start + 2].copy_from_slice(&len.to_le_bytes());
        Ok(())
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume the encoder and return the encoded bytes.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed(value: u32) -> Vec<u8> {
        let mut encoder = SpinelEncoder::new();
        encoder.write_uint_packed(value).unwrap();
        encoder.finish().to_vec()
    }

    #[test]
    fn test_uint_packed_boundaries() {
        assert_eq!(packed(0), vec![0x00]);
        assert_eq!(packed(127), vec![0x7F]);
        assert_eq!(packed(128), vec![0x80, 0x01]);
        assert_eq!(packed(16383), vec![0xFF, 0x7F]);
        assert_eq!(packed(16384), vec![0x80, 0x80, 0x01]);
        assert_eq!(packed(MAX_UINT_PACKED), vec![0xFF, 0xFF, 0x7F]);
    }

    #[test]
    fn test_uint_packed_too_large() {
        let mut encoder = SpinelEncoder::new();
        let result = encoder.write_uint_packed(MAX_UINT_PACKED + 1);
        assert!(matches!(result, Err(SpinelError::InvalidArgs)));
        assert!(encoder.is_empty());
    }

    #[test]
    fn test_integers_little_endian() {
        let mut encoder = SpinelEncoder::new();
        encoder.write_u16(0x1234);
        encoder.write_i8(-1);
        encoder.write_u32(0xDEADBEEF);
        encoder.write_bool(true);

        assert_eq!(
            &encoder.finish()[..],
            &[0x34, 0x12, 0xFF, 0xEF, 0xBE, 0xAD, 0xDE, 0x01]
        );
    }

    #[test]
    fn test_utf8_null_terminated() {
        let mut encoder = SpinelEncoder::new();
        encoder.write_utf8("ot").unwrap();
        assert_eq!(&encoder.finish()[..], b"ot\0");
    }

    #[test]
    fn test_utf8_with_interior_null_rejected() {
        let mut encoder = SpinelEncoder::new();
        assert!(encoder.write_utf8("a\0b").is_err());
    }

    #[test]
    fn test_data_wlen_prefix() {
        let mut encoder = SpinelEncoder::new();
        encoder.write_data_wlen(&[0xAA, 0xBB, 0xCC]).unwrap();
        assert_eq!(&encoder.finish()[..], &[0x03, 0x00, 0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn test_nested_structs() {
        let mut encoder = SpinelEncoder::new();
        encoder.open_struct();
        encoder.write_u8(1);
        encoder.open_struct();
        encoder.write_u16(2);
        encoder.close_struct().unwrap();
        encoder.close_struct().unwrap();

        assert_eq!(
            &encoder.finish()[..],
            &[0x05, 0x00, 0x01, 0x02, 0x00, 0x02, 0x00]
        );
    }

    #[test]
    fn test_close_without_open_fails() {
        let mut encoder = SpinelEncoder::new();
        assert!(matches!(
            encoder.close_struct(),
            Err(SpinelError::InvalidState)
        ));
    }
}
