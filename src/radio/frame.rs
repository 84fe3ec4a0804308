//! IEEE 802.15.4 frames carried on `STREAM_RAW`.
//!
//! Transmit payload:
//! ```text
//! psdu:DataWlen | channel:u8 | max_csma_backoffs:u8 | max_frame_retries:u8 | csma_ca:bool
//! ```
//! Receive payload:
//! ```text
//! psdu:DataWlen | rssi:i8 | noise_floor:i8 | flags:u16
//!   | struct{ channel:u8, lqi:u8, timestamp:u64 } | struct{ receive_error:packed }
//! ```

use bytes::Bytes;

use crate::codec::{decode_values, encode_values, Kind, Value};
use crate::error::{Result, SpinelError};
use crate::protocol::MD_FLAG_ACKED_FP;

/// Largest 802.15.4 PSDU, FCS included.
pub const MAX_PSDU_SIZE: usize = 127;

/// Default CSMA backoff attempts per transmit.
pub const DEFAULT_MAX_CSMA_BACKOFFS: u8 = 4;

/// Default MAC retries per transmit.
pub const DEFAULT_MAX_FRAME_RETRIES: u8 = 3;

/// Transmit parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxInfo {
    pub max_csma_backoffs: u8,
    pub max_frame_retries: u8,
    pub csma_ca_enabled: bool,
}

impl Default for TxInfo {
    fn default() -> Self {
        Self {
            max_csma_backoffs: DEFAULT_MAX_CSMA_BACKOFFS,
            max_frame_retries: DEFAULT_MAX_FRAME_RETRIES,
            csma_ca_enabled: true,
        }
    }
}

/// Receive metadata filled in by the co-processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxInfo {
    pub rssi: i8,
    pub noise_floor: i8,
    pub lqi: u8,
    /// Receive time in microseconds.
    pub timestamp: u64,
    /// The ACK we sent for this frame had frame-pending set.
    pub acked_with_frame_pending: bool,
}

impl Default for RxInfo {
    fn default() -> Self {
        Self {
            rssi: i8::MAX,
            noise_floor: i8::MIN,
            lqi: 0,
            timestamp: 0,
            acked_with_frame_pending: false,
        }
    }
}

/// A radio frame plus its transmit or receive metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RadioFrame {
    pub psdu: Vec<u8>,
    pub channel: u8,
    pub tx: TxInfo,
    pub rx: RxInfo,
}

impl RadioFrame {
    /// Create a frame for transmission on `channel`.
    pub fn new(psdu: impl Into<Vec<u8>>, channel: u8) -> Result<Self> {
        let psdu = psdu.into();
        if psdu.len() > MAX_PSDU_SIZE {
            return Err(SpinelError::InvalidArgs);
        }
        Ok(Self {
            psdu,
            channel,
            ..Self::default()
        })
    }

    /// Encode as a `STREAM_RAW` set payload.
    pub fn encode_transmit(&self) -> Result<Bytes> {
        if self.psdu.len() > MAX_PSDU_SIZE {
            return Err(SpinelError::InvalidArgs);
        }
        encode_values(&[
            Value::DataWlen(Bytes::copy_from_slice(&self.psdu)),
            Value::U8(self.channel),
            Value::U8(self.tx.max_csma_backoffs),
            Value::U8(self.tx.max_frame_retries),
            Value::Bool(self.tx.csma_ca_enabled),
        ])
    }

    /// Parse a received frame (or ACK) reported on `STREAM_RAW`.
    ///
    /// A non-zero receive error is returned as the peer's native status.
    pub fn parse_received(payload: &[u8]) -> Result<Self> {
        let kinds = [
            Kind::DataWlen,
            Kind::I8,
            Kind::I8,
            Kind::U16,
            Kind::Struct(vec![Kind::U8, Kind::U8, Kind::U64]),
            Kind::Struct(vec![Kind::UintPacked]),
        ];
        let values = decode_values(payload, &kinds)?;

        let [psdu, rssi, noise_floor, flags, phy, vendor] = values.as_slice() else {
            return Err(SpinelError::parse("Truncated radio frame"));
        };
        let (Some(psdu), Some(phy), Some(vendor)) =
            (psdu.as_bytes(), phy.as_struct(), vendor.as_struct())
        else {
            return Err(SpinelError::parse("Malformed radio frame"));
        };
        let [channel, lqi, timestamp] = phy else {
            return Err(SpinelError::parse("Malformed radio frame metadata"));
        };

        let receive_error = vendor.first().and_then(Value::as_uint).unwrap_or(0);
        if receive_error != 0 {
            return Err(SpinelError::Status(receive_error as u32));
        }
        if psdu.len() > MAX_PSDU_SIZE {
            return Err(SpinelError::parse(format!(
                "Radio frame too long: {} bytes",
                psdu.len()
            )));
        }

        let int = |value: &Value| value.as_int().unwrap_or_default();
        let uint = |value: &Value| value.as_uint().unwrap_or_default();

        Ok(Self {
            psdu: psdu.to_vec(),
            channel: uint(channel) as u8,
            tx: TxInfo::default(),
            rx: RxInfo {
                rssi: int(rssi) as i8,
                noise_floor: int(noise_floor) as i8,
                lqi: uint(lqi) as u8,
                timestamp: uint(timestamp),
                acked_with_frame_pending: (uint(flags) as u16 & MD_FLAG_ACKED_FP) != 0,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::SpinelEncoder;

    fn received(psdu: &[u8], flags: u16, receive_error: u32) -> Bytes {
        let mut encoder = SpinelEncoder::new();
        encoder.write_data_wlen(psdu).unwrap();
        encoder.write_i8(-60);
        encoder.write_i8(-95);
        encoder.write_u16(flags);
        encoder.open_struct();
        encoder.write_u8(20);
        encoder.write_u8(180);
        encoder.write_u64(0x0102_0304);
        encoder.close_struct().unwrap();
        encoder.open_struct();
        encoder.write_uint_packed(receive_error).unwrap();
        encoder.close_struct().unwrap();
        encoder.finish()
    }

    #[test]
    fn test_encode_transmit() {
        let mut frame = RadioFrame::new(vec![0x41, 0x88, 0x01], 11).unwrap();
        frame.tx.csma_ca_enabled = false;

        let payload = frame.encode_transmit().unwrap();
        assert_eq!(
            &payload[..],
            &[0x03, 0x00, 0x41, 0x88, 0x01, 11, 4, 3, 0]
        );
    }

    #[test]
    fn test_psdu_too_long() {
        assert!(matches!(
            RadioFrame::new(vec![0; MAX_PSDU_SIZE + 1], 11),
            Err(SpinelError::InvalidArgs)
        ));
    }

    #[test]
    fn test_parse_received() {
        let frame = RadioFrame::parse_received(&received(&[1, 2, 3], 0, 0)).unwrap();
        assert_eq!(frame.psdu, vec![1, 2, 3]);
        assert_eq!(frame.channel, 20);
        assert_eq!(frame.rx.rssi, -60);
        assert_eq!(frame.rx.noise_floor, -95);
        assert_eq!(frame.rx.lqi, 180);
        assert_eq!(frame.rx.timestamp, 0x0102_0304);
        assert!(!frame.rx.acked_with_frame_pending);
    }

    #[test]
    fn test_parse_acked_frame_pending_flag() {
        let frame =
            RadioFrame::parse_received(&received(&[1], MD_FLAG_ACKED_FP, 0)).unwrap();
        assert!(frame.rx.acked_with_frame_pending);
    }

    #[test]
    fn test_parse_receive_error() {
        let result = RadioFrame::parse_received(&received(&[1], 0, 7));
        assert!(matches!(result, Err(SpinelError::Status(7))));
    }

    #[test]
    fn test_parse_truncated() {
        let payload = received(&[1, 2, 3], 0, 0);
        let result = RadioFrame::parse_received(&payload[..6]);
        assert!(matches!(result, Err(SpinelError::Parse(_))));
    }
}
