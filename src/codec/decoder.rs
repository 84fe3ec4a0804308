//! Spinel datatype decoder.
//!
//! A cursor over a borrowed payload. Every read either advances past the
//! value or fails with [`SpinelError::Parse`] and leaves the cursor in place.

use crate::error::{Result, SpinelError};

/// Cursor reading Spinel datatypes from a byte slice.
#[derive(Debug, Clone)]
pub struct SpinelDecoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SpinelDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    #[inline]
    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let rest = self.remaining();
        if rest.len() < len {
            return Err(SpinelError::parse(format!(
                "Need {} bytes, {} remaining",
                len,
                rest.len()
            )));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.take_array::<1>()?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => {
                self.pos -= 1;
                Err(SpinelError::parse(format!("Invalid bool 0x{:02x}", other)))
            }
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.take_array::<1>()?[0] as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    /// Read a packed unsigned integer of up to five bytes.
    pub fn read_uint_packed(&mut self) -> Result<u32> {
        let rest = self.remaining();
        let mut value: u32 = 0;

        for (i, &byte) in rest.iter().enumerate().take(5) {
            // The fifth byte only carries bits 28..31.
            if i == 4 && byte & 0xF0 != 0 {
                break;
            }
            value |= ((byte & 0x7F) as u32) << (7 * i);
            if byte & 0x80 == 0 {
                self.pos += i + 1;
                return Ok(value);
            }
        }

        Err(SpinelError::parse("Truncated or oversized packed integer"))
    }

    pub fn read_eui64(&mut self) -> Result<[u8; 8]> {
        self.take_array()
    }

    /// Read a null-terminated UTF-8 string.
    ///
    /// A missing terminator at the end of the payload is tolerated.
    pub fn read_utf8(&mut self) -> Result<&'a str> {
        let rest = self.remaining();
        let (text, consumed) = match rest.iter().position(|&b| b == 0) {
            Some(nul) => (&rest[..nul], nul + 1),
            None => (rest, rest.len()),
        };
        let text = std::str::from_utf8(text).map_err(|e| SpinelError::parse(e.to_string()))?;
        self.pos += consumed;
        Ok(text)
    }

    /// Read all remaining bytes.
    pub fn read_data(&mut self) -> &'a [u8] {
        let rest = self.remaining();
        self.pos = self.buf.len();
        rest
    }

    /// Read data preceded by its u16 length.
    pub fn read_data_wlen(&mut self) -> Result<&'a [u8]> {
        let start = self.pos;
        let len = self.read_u16()? as usize;
        self.take(len).map_err(|e| {
            self.pos = start;
            e
        })
    }

    /// Read a length-prefixed struct and return a decoder over its body.
    pub fn read_struct(&mut self) -> Result<SpinelDecoder<'a>> {
        self.read_data_wlen().map(SpinelDecoder::new)
    }
}
