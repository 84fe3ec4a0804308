//! Spinel command frame.
//!
//! Layout (before HDLC framing):
//! ```text
//! header:u8 | command:packed | key:packed | payload...
//! ```
//! `NOOP` and `RESET` frames stop after the command.
//!
//! # Example
//!
//! ```
//! use ncp_spinel::protocol::{cmd, prop, SpinelFrame};
//! use bytes::Bytes;
//!
//! let frame = SpinelFrame::new(1, cmd::PROP_VALUE_SET, prop::PHY_ENABLED, Bytes::from_static(&[1]));
//! let bytes = frame.encode().unwrap();
//! assert_eq!(&bytes[..], &[0x81, 0x03, 0x20, 0x01]);
//!
//! let parsed = SpinelFrame::decode(&bytes).unwrap();
//! assert_eq!(parsed.tid(), 1);
//! assert_eq!(parsed.key, prop::PHY_ENABLED);
//! ```

use bytes::Bytes;

use super::wire_format::{cmd, Header};
use crate::codec::{SpinelDecoder, SpinelEncoder};
use crate::error::{Result, SpinelError};

/// A decoded Spinel frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpinelFrame {
    /// Decoded header byte.
    pub header: Header,
    /// Command identifier.
    pub command: u32,
    /// Property key (0 for commands without one).
    pub key: u32,
    /// Property payload (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl SpinelFrame {
    /// Create a property frame on interface 0.
    pub fn new(tid: u8, command: u32, key: u32, payload: Bytes) -> Self {
        Self {
            header: Header::new(tid),
            command,
            key,
            payload,
        }
    }

    /// Create the no-response `RESET` frame.
    pub fn reset() -> Self {
        Self::new(0, cmd::RESET, 0, Bytes::new())
    }

    /// Transaction ID.
    #[inline]
    pub fn tid(&self) -> u8 {
        self.header.tid
    }

    /// Check if this command carries a property key.
    #[inline]
    fn has_key(command: u32) -> bool {
        command != cmd::NOOP && command != cmd::RESET
    }

    /// Encode to raw Spinel bytes.
    pub fn encode(&self) -> Result<Bytes> {
        let mut encoder = SpinelEncoder::with_capacity(4 + self.payload.len());
        encoder.write_u8(self.header.encode());
        encoder.write_uint_packed(self.command)?;
        if Self::has_key(self.command) {
            encoder.write_uint_packed(self.key)?;
            encoder.write_data(&self.payload);
        }
        Ok(encoder.finish())
    }

    /// Decode from raw Spinel bytes. The payload shares the input buffer.
    pub fn decode(bytes: &Bytes) -> Result<Self> {
        let mut decoder = SpinelDecoder::new(bytes);

        let header = Header::decode(decoder.read_u8()?)?;
        let command = decoder.read_uint_packed()?;
        let key = if Self::has_key(command) {
            decoder.read_uint_packed()?
        } else {
            0
        };

        let offset = bytes.len() - decoder.remaining().len();
        if header.iid != 0 {
            return Err(SpinelError::parse(format!(
                "Unexpected interface id {}",
                header.iid
            )));
        }

        Ok(Self {
            header,
            command,
            key,
            payload: bytes.slice(offset..),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::prop;

    #[test]
    fn test_reset_frame() {
        let bytes = SpinelFrame::reset().encode().unwrap();
        assert_eq!(&bytes[..], &[0x80, 0x01]);

        let parsed = SpinelFrame::decode(&bytes).unwrap();
        assert_eq!(parsed.command, cmd::RESET);
        assert!(parsed.header.is_unsolicited());
        assert!(parsed.payload.is_empty());
    }

    #[test]
    fn test_multi_byte_key() {
        let frame = SpinelFrame::new(
            3,
            cmd::PROP_VALUE_INSERT,
            prop::MAC_SRC_MATCH_SHORT_ADDRESSES,
            Bytes::from_static(&[0x34, 0x12]),
        );
        let bytes = frame.encode().unwrap();
        assert_eq!(&bytes[..], &[0x83, 0x04, 0x84, 0x26, 0x34, 0x12]);

        let parsed = SpinelFrame::decode(&bytes).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn test_payload_is_zero_copy() {
        let bytes = Bytes::from_static(&[0x86, 0x06, 0x21, 0x0B]);
        let parsed = SpinelFrame::decode(&bytes).unwrap();

        assert_eq!(&parsed.payload[..], &[0x0B]);
        assert_eq!(parsed.payload.as_ptr(), bytes[3..].as_ptr());
    }

    #[test]
    fn test_missing_flag_rejected() {
        let bytes = Bytes::from_static(&[0x06, 0x06, 0x21]);
        assert!(matches!(
            SpinelFrame::decode(&bytes),
            Err(SpinelError::Parse(_))
        ));
    }

    #[test]
    fn test_nonzero_iid_rejected() {
        let bytes = Bytes::from_static(&[0x91, 0x06, 0x21]);
        assert!(SpinelFrame::decode(&bytes).is_err());
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let bytes = Bytes::from_static(&[0x81]);
        assert!(SpinelFrame::decode(&bytes).is_err());
    }
}
