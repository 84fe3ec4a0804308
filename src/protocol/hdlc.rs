//! HDLC-lite framing for the co-processor byte link.
//!
//! Every Spinel frame travels as:
//! ```text
//! 0x7E | escaped(payload) | escaped(fcs_lo) | escaped(fcs_hi) | 0x7E
//! ```
//! Bytes in the escaped set are sent as `0x7D, byte ^ 0x20`. The FCS is the
//! 16-bit X.25 CRC of the unescaped payload.
//!
//! The decoder is a byte-driven state machine:
//! - `NoSync`: discarding bytes until a flag arrives
//! - `Sync`: accumulating payload bytes
//! - `Escaped`: previous byte was the escape marker
//!
//! # Example
//!
//! ```ignore
//! use ncp_spinel::protocol::{HdlcDecoder, HdlcEncoder};
//!
//! let wire = HdlcEncoder::encode(&[0x80, 0x01]);
//! let mut decoder = HdlcDecoder::with_max_frame_size(2048);
//!
//! for frame in decoder.decode(&wire) {
//!     println!("Got frame: {:?}", frame);
//! }
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, SpinelError};

/// Frame delimiter.
pub const FLAG_SEQUENCE: u8 = 0x7E;
/// Escape marker.
pub const ESCAPE_SEQUENCE: u8 = 0x7D;
/// Value xor-ed into an escaped byte.
pub const ESCAPE_XOR: u8 = 0x20;

const FLAG_XON: u8 = 0x11;
const FLAG_XOFF: u8 = 0x13;
const FLAG_SPECIAL: u8 = 0xF8;

const FCS_INIT: u16 = 0xFFFF;
const FCS_GOOD: u16 = 0xF0B8;
const FCS_POLY: u16 = 0x8408;
const FCS_SIZE: usize = 2;

/// Update a running FCS-16 with one byte.
#[inline]
pub fn fcs16(mut fcs: u16, byte: u8) -> u16 {
    fcs ^= byte as u16;
    for _ in 0..8 {
        fcs = if fcs & 1 != 0 {
            (fcs >> 1) ^ FCS_POLY
        } else {
            fcs >> 1
        };
    }
    fcs
}

#[inline]
fn needs_escape(byte: u8) -> bool {
    matches!(
        byte,
        FLAG_SEQUENCE | ESCAPE_SEQUENCE | FLAG_XON | FLAG_XOFF | FLAG_SPECIAL
    )
}

/// Stateless HDLC-lite encoder.
pub struct HdlcEncoder;

impl HdlcEncoder {
    /// Encode one frame, including both flags and the FCS.
    pub fn encode(payload: &[u8]) -> Bytes {
        let mut out = BytesMut::with_capacity(payload.len() * 2 + 6);
        Self::encode_into(payload, &mut out);
        out.freeze()
    }

    /// Encode one frame, appending to `out`.
    pub fn encode_into(payload: &[u8], out: &mut BytesMut) {
        out.put_u8(FLAG_SEQUENCE);

        let mut fcs = FCS_INIT;
        for &byte in payload {
            fcs = fcs16(fcs, byte);
            Self::put_escaped(out, byte);
        }

        let fcs = fcs ^ 0xFFFF;
        Self::put_escaped(out, (fcs & 0xFF) as u8);
        Self::put_escaped(out, (fcs >> 8) as u8);

        out.put_u8(FLAG_SEQUENCE);
    }

    #[inline]
    fn put_escaped(out: &mut BytesMut, byte: u8) {
        if needs_escape(byte) {
            out.put_u8(ESCAPE_SEQUENCE);
            out.put_u8(byte ^ ESCAPE_XOR);
        } else {
            out.put_u8(byte);
        }
    }
}

/// Decoder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for a flag to synchronize.
    NoSync,
    /// Inside a frame.
    Sync,
    /// Inside a frame, after an escape marker.
    Escaped,
}

/// Incremental HDLC-lite decoder.
///
/// Bytes are fed in arbitrary chunks; each completed frame (or framing error)
/// is returned in arrival order.
pub struct HdlcDecoder {
    /// Unescaped bytes of the frame being assembled, FCS included.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Running FCS over `buffer`.
    fcs: u16,
    /// Largest accepted frame (payload plus FCS).
    max_frame_size: usize,
}

impl HdlcDecoder {
    /// Create a decoder accepting frames up to `max_frame_size` payload bytes.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max_frame_size + FCS_SIZE),
            state: State::NoSync,
            fcs: FCS_INIT,
            max_frame_size: max_frame_size + FCS_SIZE,
        }
    }

    /// Feed raw link bytes and collect every frame they complete.
    ///
    /// Errors are per-frame: a bad FCS or an oversize frame yields an `Err`
    /// entry and decoding continues with the next frame.
    pub fn decode(&mut self, data: &[u8]) -> Vec<Result<Bytes>> {
        let mut frames = Vec::new();

        for &byte in data {
            match self.state {
                State::NoSync => {
                    if byte == FLAG_SEQUENCE {
                        self.start_frame();
                    }
                }

                State::Sync => match byte {
                    ESCAPE_SEQUENCE => self.state = State::Escaped,
                    FLAG_SEQUENCE => {
                        if let Some(result) = self.finish_frame() {
                            frames.push(result);
                        }
                        self.start_frame();
                    }
                    _ => {
                        if let Err(e) = self.push_byte(byte) {
                            frames.push(Err(e));
                        }
                    }
                },

                State::Escaped => {
                    if let Err(e) = self.push_byte(byte ^ ESCAPE_XOR) {
                        frames.push(Err(e));
                    } else {
                        self.state = State::Sync;
                    }
                }
            }
        }

        frames
    }

    /// Drop any partial frame and wait for the next flag.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.fcs = FCS_INIT;
        self.state = State::NoSync;
    }

    fn start_frame(&mut self) {
        self.buffer.clear();
        self.fcs = FCS_INIT;
        self.state = State::Sync;
    }

    fn push_byte(&mut self, byte: u8) -> Result<()> {
        if self.buffer.len() >= self.max_frame_size {
            tracing::debug!(len = self.buffer.len(), "HDLC frame exceeds buffer");
            self.reset();
            return Err(SpinelError::NoBufs);
        }
        self.buffer.put_u8(byte);
        self.fcs = fcs16(self.fcs, byte);
        Ok(())
    }

    /// Close the current frame. `None` means there was nothing between flags.
    fn finish_frame(&mut self) -> Option<Result<Bytes>> {
        if self.buffer.is_empty() {
            return None;
        }

        if self.buffer.len() < FCS_SIZE || self.fcs != FCS_GOOD {
            return Some(Err(SpinelError::parse(format!(
                "HDLC frame of {} bytes failed FCS check",
                self.buffer.len()
            ))));
        }

        let len = self.buffer.len() - FCS_SIZE;
        let mut frame = self.buffer.split();
        frame.truncate(len);
        Some(Ok(frame.freeze()))
    }

    /// Check if a frame is partially assembled.
    pub fn is_idle(&self) -> bool {
        self.state != State::Escaped && self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut HdlcDecoder, wire: &[u8]) -> Vec<Bytes> {
        decoder
            .decode(wire)
            .into_iter()
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn test_fcs_check_value() {
        let fcs = b"123456789".iter().fold(FCS_INIT, |fcs, &b| fcs16(fcs, b));
        assert_eq!(fcs ^ 0xFFFF, 0x906E);
    }

    #[test]
    fn test_encode_layout() {
        let wire = HdlcEncoder::encode(&[0x80, 0x01]);

        assert_eq!(wire[0], FLAG_SEQUENCE);
        assert_eq!(wire[wire.len() - 1], FLAG_SEQUENCE);
        assert_eq!(&wire[1..3], &[0x80, 0x01]);
    }

    #[test]
    fn test_special_bytes_are_escaped() {
        let specials = [0x7E, 0x11, 0x13, 0x7E, 0x7D, 0xF8];
        let wire = HdlcEncoder::encode(&specials);

        // Only the delimiters may carry a raw flag byte.
        let inner = &wire[1..wire.len() - 1];
        assert!(!inner.contains(&FLAG_SEQUENCE));
        assert_eq!(&inner[..4], &[0x7D, 0x5E, 0x7D, 0x31]);

        let mut decoder = HdlcDecoder::with_max_frame_size(64);
        let frames = decode_all(&mut decoder, &wire);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &specials);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut wire = BytesMut::new();
        HdlcEncoder::encode_into(b"OpenThread Rocks", &mut wire);
        HdlcEncoder::encode_into(b"Hello there!", &mut wire);

        let mut decoder = HdlcDecoder::with_max_frame_size(64);
        let frames = decode_all(&mut decoder, &wire);

        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], b"OpenThread Rocks");
        assert_eq!(&frames[1][..], b"Hello there!");
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_byte_at_a_time() {
        let wire = HdlcEncoder::encode(b"Think good thoughts");
        let mut decoder = HdlcDecoder::with_max_frame_size(64);

        let mut all_frames = Vec::new();
        for byte in wire.iter() {
            all_frames.extend(decode_all(&mut decoder, &[*byte]));
        }

        assert_eq!(all_frames.len(), 1);
        assert_eq!(&all_frames[0][..], b"Think good thoughts");
    }

    #[test]
    fn test_leading_garbage_is_skipped() {
        let mut wire = vec![0x01, 0x02, 0x03];
        wire.extend_from_slice(&HdlcEncoder::encode(b"sync"));

        let mut decoder = HdlcDecoder::with_max_frame_size(64);
        let frames = decode_all(&mut decoder, &wire);

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"sync");
    }

    #[test]
    fn test_bad_fcs_reported() {
        let mut wire = HdlcEncoder::encode(b"payload").to_vec();
        wire[2] ^= 0x01;

        let mut decoder = HdlcDecoder::with_max_frame_size(64);
        let results = decoder.decode(&wire);

        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(SpinelError::Parse(_))));
    }

    #[test]
    fn test_short_frame_reported() {
        let mut decoder = HdlcDecoder::with_max_frame_size(64);
        let results = decoder.decode(&[FLAG_SEQUENCE, 0xAA, FLAG_SEQUENCE]);

        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn test_back_to_back_flags_are_silent() {
        let mut decoder = HdlcDecoder::with_max_frame_size(64);
        let results = decoder.decode(&[FLAG_SEQUENCE, FLAG_SEQUENCE, FLAG_SEQUENCE]);
        assert!(results.is_empty());
    }

    #[test]
    fn test_oversize_frame_then_recovery() {
        let mut decoder = HdlcDecoder::with_max_frame_size(4);

        let mut wire = HdlcEncoder::encode(b"far too long").to_vec();
        wire.extend_from_slice(&HdlcEncoder::encode(b"ok"));

        let results = decoder.decode(&wire);
        let errors = results.iter().filter(|r| r.is_err()).count();
        let frames: Vec<_> = results.into_iter().filter_map(|r| r.ok()).collect();

        assert_eq!(errors, 1);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"ok");
    }

    #[test]
    fn test_empty_payload_frame() {
        let wire = HdlcEncoder::encode(b"");
        let mut decoder = HdlcDecoder::with_max_frame_size(64);
        let frames = decode_all(&mut decoder, &wire);

        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_empty());
    }
}
