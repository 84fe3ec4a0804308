//! Radio adapter - an IEEE 802.15.4 radio driven through Spinel properties.
//!
//! [`RadioSpinel`] keeps the local radio state machine:
//!
//! ```text
//! Disabled --enable--> Sleep --receive--> Receive --transmit--> Transmit
//!    ^                   ^ <----sleep----    ^ <---transmit done---'
//!    '------disable------'-------------------'
//! ```
//!
//! Transmits are queued by [`RadioSpinel::transmit`] and sent on the next
//! [`RadioSpinel::process`], which also reports completions and received
//! frames to a [`RadioHandler`].
//!
//! # Example
//!
//! ```ignore
//! use ncp_spinel::radio::{RadioFrame, RadioSpinel};
//!
//! let mut radio = RadioSpinel::open("/dev/ttyACM0".as_ref(), config).await?;
//! radio.enable().await?;
//! radio.receive(11).await?;
//! radio.transmit(RadioFrame::new(psdu, 11)?)?;
//! loop {
//!     radio.wait_for_event().await?;
//!     radio.process(&mut handler).await?;
//! }
//! ```

mod frame;

pub use frame::{
    RadioFrame, RxInfo, TxInfo, DEFAULT_MAX_CSMA_BACKOFFS, DEFAULT_MAX_FRAME_RETRIES,
    MAX_PSDU_SIZE,
};

use std::path::Path;

use bytes::Bytes;
use tokio::time::Instant;

use crate::codec::{decode_single, decode_values, Kind, SpinelDecoder, Value};
use crate::config::SpinelConfig;
use crate::error::{Result, SpinelError};
use crate::protocol::{
    caps, prop, promiscuous_mode, radio_caps, scan_state, PROTOCOL_VERSION_MAJOR,
    PROTOCOL_VERSION_MINOR,
};
use crate::spinel::{NcpSpinel, NotificationHandler, PendingTransmit, TransmitResult};

/// RSSI reported when the co-processor cannot measure it.
pub const RSSI_INVALID: i8 = 127;

/// Callbacks from [`RadioSpinel::process`].
pub trait RadioHandler {
    /// A frame was received while the radio was listening.
    fn receive_done(&mut self, frame: &RadioFrame);

    /// The queued transmit finished. `ack` is the received ACK, if any.
    fn transmit_done(&mut self, frame: &RadioFrame, ack: Option<&RadioFrame>, result: Result<()>);

    /// An energy scan finished with the strongest RSSI seen.
    fn energy_scan_done(&mut self, _max_rssi: i8) {}
}

/// Radio state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    Disabled,
    Sleep,
    Receive,
    Transmit,
}

/// Progress of the queued transmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Idle,
    Sent,
    Done,
}

/// A radio driven over one co-processor session.
pub struct RadioSpinel {
    ncp: NcpSpinel,
    state: RadioState,

    tx_state: TxState,
    tx_frame: Option<RadioFrame>,
    tx_pending: Option<PendingTransmit>,
    tx_deadline: Option<Instant>,
    tx_result: Option<TransmitResult>,

    channel: Option<u8>,
    pan_id: u16,
    short_address: u16,
    extended_address: [u8; 8],
    promiscuous: bool,
    rx_sensitivity: i8,

    radio_caps: u32,
    supports_log_stream: bool,
    version: String,
    eui64: [u8; 8],
}

impl RadioSpinel {
    /// Open the co-processor at `path`, reset it and check compatibility.
    pub async fn open(path: &Path, config: SpinelConfig) -> Result<Self> {
        let ncp = NcpSpinel::open(path, config).await?;
        Self::with_session(ncp).await
    }

    /// Check compatibility of an already reset session and wrap it.
    pub async fn with_session(ncp: NcpSpinel) -> Result<Self> {
        // Reset notifications queued during the settle delay.
        ncp.process(&mut IgnoreNotifications);

        let mut radio = Self {
            ncp,
            state: RadioState::Disabled,
            tx_state: TxState::Idle,
            tx_frame: None,
            tx_pending: None,
            tx_deadline: None,
            tx_result: None,
            channel: None,
            pan_id: 0xFFFF,
            short_address: 0,
            extended_address: [0; 8],
            promiscuous: false,
            rx_sensitivity: 0,
            radio_caps: 0,
            supports_log_stream: false,
            version: String::new(),
            eui64: [0; 8],
        };

        radio.check_protocol_version().await?;
        radio.check_capabilities().await?;
        radio.check_radio_capabilities().await?;

        let version = radio.get_single(prop::NCP_VERSION, Kind::Utf8).await?;
        radio.version = version.as_str().unwrap_or_default().to_string();
        radio.eui64 = radio.fetch_ieee_eui64().await?;

        tracing::info!(
            version = %radio.version,
            caps = radio.radio_caps,
            "Radio co-processor ready"
        );
        Ok(radio)
    }

    async fn check_protocol_version(&self) -> Result<()> {
        let values = self
            .ncp
            .get_values(prop::PROTOCOL_VERSION, &[Kind::UintPacked, Kind::UintPacked])
            .await?;
        let major = values.first().and_then(Value::as_uint).unwrap_or(0);
        let minor = values.get(1).and_then(Value::as_uint).unwrap_or(0);

        if major != PROTOCOL_VERSION_MAJOR as u64 || minor != PROTOCOL_VERSION_MINOR as u64 {
            tracing::error!(major, minor, "Spinel version mismatch");
            return Err(SpinelError::Incompatible(format!(
                "protocol version {}.{}",
                major, minor
            )));
        }
        Ok(())
    }

    async fn check_capabilities(&mut self) -> Result<()> {
        let payload = self.ncp.get(prop::CAPS).await?;
        let mut decoder = SpinelDecoder::new(&payload);
        let mut supports_raw = false;

        while !decoder.is_empty() {
            match decoder.read_uint_packed()? {
                caps::MAC_RAW => supports_raw = true,
                caps::OPENTHREAD_LOG_METADATA => self.supports_log_stream = true,
                _ => {}
            }
        }

        if !supports_raw {
            tracing::error!("Co-processor does not support raw MAC");
            return Err(SpinelError::Incompatible("raw MAC capability missing".into()));
        }
        Ok(())
    }

    async fn check_radio_capabilities(&mut self) -> Result<()> {
        let value = self.get_single(prop::RADIO_CAPS, Kind::UintPacked).await?;
        self.radio_caps = value.as_uint().unwrap_or(0) as u32;

        if self.radio_caps & radio_caps::REQUIRED != radio_caps::REQUIRED {
            tracing::error!(caps = self.radio_caps, "Co-processor lacks required radio capabilities");
            return Err(SpinelError::Incompatible(format!(
                "radio capabilities {:#x}",
                self.radio_caps
            )));
        }
        Ok(())
    }

    async fn get_single(&self, key: u32, kind: Kind) -> Result<Value> {
        let payload = self.ncp.get(key).await?;
        decode_single(&payload, kind)
    }

    async fn get_i8(&self, key: u32) -> Result<i8> {
        self.get_single(key, Kind::I8)
            .await?
            .as_int()
            .map(|v| v as i8)
            .ok_or_else(|| SpinelError::parse("Expected int8"))
    }

    async fn fetch_ieee_eui64(&self) -> Result<[u8; 8]> {
        self.get_single(prop::HWADDR, Kind::Eui64)
            .await?
            .as_eui64()
            .copied()
            .ok_or_else(|| SpinelError::parse("Expected eui64"))
    }

    /// Underlying transaction layer.
    pub fn session(&self) -> &NcpSpinel {
        &self.ncp
    }

    pub fn state(&self) -> RadioState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state != RadioState::Disabled
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Factory EUI-64 read at open.
    pub fn ieee_eui64(&self) -> [u8; 8] {
        self.eui64
    }

    pub fn radio_caps(&self) -> u32 {
        self.radio_caps
    }

    /// Check if the co-processor tags its log stream with levels.
    pub fn supports_log_stream(&self) -> bool {
        self.supports_log_stream
    }

    pub fn channel(&self) -> Option<u8> {
        self.channel
    }

    pub fn pan_id(&self) -> u16 {
        self.pan_id
    }

    pub fn short_address(&self) -> u16 {
        self.short_address
    }

    pub fn extended_address(&self) -> [u8; 8] {
        self.extended_address
    }

    pub fn is_promiscuous(&self) -> bool {
        self.promiscuous
    }

    /// Receive sensitivity read at enable.
    pub fn receive_sensitivity(&self) -> i8 {
        self.rx_sensitivity
    }

    /// Power on the radio: Disabled -> Sleep.
    pub async fn enable(&mut self) -> Result<()> {
        if self.is_enabled() {
            return Ok(());
        }

        match self.ncp_enable().await {
            Ok(()) => {
                self.state = RadioState::Sleep;
                tracing::info!("Radio enabled");
                Ok(())
            }
            Err(SpinelError::LinkLost) => Err(SpinelError::LinkLost),
            Err(e) => {
                tracing::warn!("Radio enable failed: {}", e);
                Err(SpinelError::Failed)
            }
        }
    }

    async fn ncp_enable(&mut self) -> Result<()> {
        self.ncp.set(prop::PHY_ENABLED, &[Value::Bool(true)]).await?;
        self.ncp
            .set(prop::MAC_15_4_PANID, &[Value::U16(self.pan_id)])
            .await?;
        self.ncp
            .set(prop::MAC_15_4_SADDR, &[Value::U16(self.short_address)])
            .await?;
        self.rx_sensitivity = self.get_i8(prop::PHY_RX_SENSITIVITY).await?;
        Ok(())
    }

    /// Power off the radio from any state.
    pub async fn disable(&mut self) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        self.ncp.set(prop::PHY_ENABLED, &[Value::Bool(false)]).await?;
        self.reset_tx();
        self.state = RadioState::Disabled;
        tracing::info!("Radio disabled");
        Ok(())
    }

    /// Stop listening: Receive -> Sleep.
    pub async fn sleep(&mut self) -> Result<()> {
        match self.state {
            RadioState::Sleep => Ok(()),
            RadioState::Receive => {
                self.ncp
                    .set(prop::MAC_RAW_STREAM_ENABLED, &[Value::Bool(false)])
                    .await?;
                self.state = RadioState::Sleep;
                Ok(())
            }
            _ => Err(SpinelError::InvalidState),
        }
    }

    /// Listen on `channel`. Abandons a queued or in-flight transmit.
    pub async fn receive(&mut self, channel: u8) -> Result<()> {
        if !self.is_enabled() {
            return Err(SpinelError::InvalidState);
        }

        if self.channel != Some(channel) {
            self.ncp.set(prop::PHY_CHAN, &[Value::U8(channel)]).await?;
            self.channel = Some(channel);
        }

        if self.state == RadioState::Sleep {
            self.ncp
                .set(prop::MAC_RAW_STREAM_ENABLED, &[Value::Bool(true)])
                .await?;
        }

        self.reset_tx();
        self.state = RadioState::Receive;
        Ok(())
    }

    /// Queue `frame` for transmission: Receive -> Transmit.
    ///
    /// The frame is sent on the next [`process`](Self::process).
    pub fn transmit(&mut self, frame: RadioFrame) -> Result<()> {
        if self.state != RadioState::Receive {
            return Err(SpinelError::InvalidState);
        }
        if frame.psdu.len() > MAX_PSDU_SIZE {
            return Err(SpinelError::InvalidArgs);
        }

        self.tx_frame = Some(frame);
        self.tx_state = TxState::Idle;
        self.state = RadioState::Transmit;
        Ok(())
    }

    fn reset_tx(&mut self) {
        if self.tx_state == TxState::Sent {
            self.ncp.cancel_transmit();
        }
        self.tx_state = TxState::Idle;
        self.tx_frame = None;
        self.tx_pending = None;
        self.tx_deadline = None;
        self.tx_result = None;
    }

    async fn send_transmit(&mut self) {
        let Some(frame) = self.tx_frame.as_ref() else {
            return;
        };

        match self.ncp.transmit(frame).await {
            Ok(pending) => {
                self.tx_pending = Some(pending);
                self.tx_deadline = Some(Instant::now() + self.ncp.config().tx_timeout);
                self.tx_state = TxState::Sent;
            }
            Err(e) => {
                tracing::warn!("Radio transmit failed: {}", e);
                self.tx_result = Some(Err(e));
                self.tx_state = TxState::Done;
            }
        }
    }

    fn poll_transmit(&mut self) {
        if self.tx_state != TxState::Sent {
            return;
        }

        if let Some(result) = self.tx_pending.as_mut().and_then(PendingTransmit::try_result) {
            self.complete_transmit(result);
        } else if self.tx_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            tracing::warn!("Transmit done not received before deadline");
            self.ncp.cancel_transmit();
            self.complete_transmit(Err(SpinelError::ResponseTimeout));
        }
    }

    fn complete_transmit(&mut self, result: TransmitResult) {
        self.tx_pending = None;
        self.tx_deadline = None;
        self.tx_result = Some(result);
        self.tx_state = TxState::Done;
    }

    /// Suspend until [`process`](Self::process) has work to do.
    pub async fn wait_for_event(&mut self) -> Result<()> {
        if self.state == RadioState::Transmit && self.tx_state != TxState::Sent {
            return Ok(());
        }

        let (Some(pending), Some(deadline)) = (self.tx_pending.as_mut(), self.tx_deadline) else {
            return self.ncp.wait_for_frames().await;
        };

        let done = tokio::select! {
            result = pending => Some(result),
            frames = self.ncp.wait_for_frames() => {
                frames?;
                None
            }
            _ = tokio::time::sleep_until(deadline) => None,
        };
        if let Some(result) = done {
            self.complete_transmit(result);
        }
        Ok(())
    }

    /// Send the queued transmit, deliver notifications and report completions.
    ///
    /// Fails with `LinkLost` if the co-processor reset while enabled.
    pub async fn process(&mut self, handler: &mut dyn RadioHandler) -> Result<()> {
        if self.state == RadioState::Transmit && self.tx_state == TxState::Idle {
            self.send_transmit().await;
        }

        let mut dispatch = Dispatch {
            state: self.state,
            promiscuous: self.promiscuous,
            handler: &mut *handler,
            reset: None,
        };
        self.ncp.process(&mut dispatch);
        let reset = dispatch.reset;

        if let Some(status) = reset {
            if self.is_enabled() {
                tracing::error!(status, "Co-processor reset while radio enabled");
                return Err(SpinelError::LinkLost);
            }
        }

        self.poll_transmit();
        if self.state == RadioState::Transmit && self.tx_state == TxState::Done {
            let frame = self.tx_frame.take().unwrap_or_default();
            let result = self.tx_result.take().unwrap_or(Err(SpinelError::Failed));
            self.tx_state = TxState::Idle;
            self.state = RadioState::Receive;

            match result {
                Ok(ack) => handler.transmit_done(&frame, ack.as_ref(), Ok(())),
                Err(e) => handler.transmit_done(&frame, None, Err(e)),
            }
        }

        Ok(())
    }

    pub async fn set_pan_id(&mut self, pan_id: u16) -> Result<()> {
        if pan_id != self.pan_id {
            self.ncp
                .set(prop::MAC_15_4_PANID, &[Value::U16(pan_id)])
                .await?;
            self.pan_id = pan_id;
        }
        Ok(())
    }

    pub async fn set_short_address(&mut self, address: u16) -> Result<()> {
        if address != self.short_address {
            self.ncp
                .set(prop::MAC_15_4_SADDR, &[Value::U16(address)])
                .await?;
            self.short_address = address;
        }
        Ok(())
    }

    pub async fn set_extended_address(&mut self, address: [u8; 8]) -> Result<()> {
        self.ncp
            .set(prop::MAC_15_4_LADDR, &[Value::Eui64(address)])
            .await?;
        self.extended_address = address;
        Ok(())
    }

    /// Receive frames in every state except Disabled, unfiltered by address.
    pub async fn set_promiscuous(&mut self, enable: bool) -> Result<()> {
        let mode = if enable {
            promiscuous_mode::NETWORK
        } else {
            promiscuous_mode::OFF
        };
        self.ncp
            .set(prop::MAC_PROMISCUOUS_MODE, &[Value::U8(mode)])
            .await?;
        self.promiscuous = enable;
        Ok(())
    }

    pub async fn enable_src_match(&self, enable: bool) -> Result<()> {
        self.ncp
            .set(prop::MAC_SRC_MATCH_ENABLED, &[Value::Bool(enable)])
            .await
    }

    pub async fn add_src_match_short_entry(&self, address: u16) -> Result<()> {
        self.ncp
            .insert(prop::MAC_SRC_MATCH_SHORT_ADDRESSES, &[Value::U16(address)])
            .await
    }

    pub async fn add_src_match_ext_entry(&self, address: [u8; 8]) -> Result<()> {
        self.ncp
            .insert(prop::MAC_SRC_MATCH_EXTENDED_ADDRESSES, &[Value::Eui64(address)])
            .await
    }

    pub async fn clear_src_match_short_entry(&self, address: u16) -> Result<()> {
        self.ncp
            .remove(prop::MAC_SRC_MATCH_SHORT_ADDRESSES, &[Value::U16(address)])
            .await
    }

    pub async fn clear_src_match_ext_entry(&self, address: [u8; 8]) -> Result<()> {
        self.ncp
            .remove(prop::MAC_SRC_MATCH_EXTENDED_ADDRESSES, &[Value::Eui64(address)])
            .await
    }

    pub async fn clear_src_match_short_entries(&self) -> Result<()> {
        self.ncp.set(prop::MAC_SRC_MATCH_SHORT_ADDRESSES, &[]).await
    }

    pub async fn clear_src_match_ext_entries(&self) -> Result<()> {
        self.ncp
            .set(prop::MAC_SRC_MATCH_EXTENDED_ADDRESSES, &[])
            .await
    }

    /// Transmit power in dBm.
    pub async fn transmit_power(&self) -> Result<i8> {
        self.get_i8(prop::PHY_TX_POWER).await
    }

    pub async fn set_transmit_power(&self, power: i8) -> Result<()> {
        self.ncp.set(prop::PHY_TX_POWER, &[Value::I8(power)]).await
    }

    /// CCA energy-detect threshold in dBm.
    pub async fn cca_energy_detect_threshold(&self) -> Result<i8> {
        self.get_i8(prop::PHY_CCA_THRESHOLD).await
    }

    pub async fn set_cca_energy_detect_threshold(&self, threshold: i8) -> Result<()> {
        self.ncp
            .set(prop::PHY_CCA_THRESHOLD, &[Value::I8(threshold)])
            .await
    }

    /// Current RSSI, or [`RSSI_INVALID`] if it cannot be read.
    pub async fn rssi(&self) -> i8 {
        match self.get_i8(prop::PHY_RSSI).await {
            Ok(rssi) => rssi,
            Err(e) => {
                tracing::warn!("Get RSSI failed: {}", e);
                RSSI_INVALID
            }
        }
    }

    /// Start an energy scan on `channel` for `duration_ms`.
    ///
    /// The result arrives through [`RadioHandler::energy_scan_done`].
    pub async fn energy_scan(&self, channel: u8, duration_ms: u16) -> Result<()> {
        if self.radio_caps & radio_caps::ENERGY_SCAN == 0 {
            return Err(SpinelError::NotCapable);
        }

        self.ncp
            .set(
                prop::MAC_SCAN_MASK,
                &[Value::Data(Bytes::copy_from_slice(&[channel]))],
            )
            .await?;
        self.ncp
            .set(prop::MAC_SCAN_PERIOD, &[Value::U16(duration_ms)])
            .await?;
        self.ncp
            .set(prop::MAC_SCAN_STATE, &[Value::U8(scan_state::ENERGY)])
            .await
    }

    /// Close the session and stop the co-processor process, if any.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.reset_tx();
        self.state = RadioState::Disabled;
        self.ncp.shutdown().await
    }
}

/// Routes property notifications to a [`RadioHandler`].
struct Dispatch<'a> {
    state: RadioState,
    promiscuous: bool,
    handler: &'a mut dyn RadioHandler,
    reset: Option<u32>,
}

impl Dispatch<'_> {
    fn is_listening(&self) -> bool {
        self.promiscuous || matches!(self.state, RadioState::Receive | RadioState::Transmit)
    }
}

impl NotificationHandler for Dispatch<'_> {
    fn handle_value_is(&mut self, key: u32, payload: &[u8]) {
        match key {
            prop::STREAM_RAW => match RadioFrame::parse_received(payload) {
                Ok(frame) if self.is_listening() => self.handler.receive_done(&frame),
                Ok(_) => tracing::debug!(state = ?self.state, "Dropped frame while not receiving"),
                Err(e) => tracing::warn!("Handle radio frame failed: {}", e),
            },
            prop::MAC_ENERGY_SCAN_RESULT => {
                match decode_values(payload, &[Kind::U8, Kind::I8]) {
                    Ok(values) => {
                        let max_rssi = values.get(1).and_then(Value::as_int).unwrap_or(0) as i8;
                        self.handler.energy_scan_done(max_rssi);
                    }
                    Err(e) => tracing::warn!("Handle energy scan result failed: {}", e),
                }
            }
            _ => tracing::debug!(key, "Unhandled property"),
        }
    }

    fn handle_reset(&mut self, status: u32) {
        self.reset = Some(status);
    }
}

struct IgnoreNotifications;

impl NotificationHandler for IgnoreNotifications {
    fn handle_value_is(&mut self, key: u32, _payload: &[u8]) {
        tracing::debug!(key, "Ignored notification before open");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::SpinelEncoder;

    #[derive(Default)]
    struct Recorder {
        received: Vec<RadioFrame>,
        scans: Vec<i8>,
    }

    impl RadioHandler for Recorder {
        fn receive_done(&mut self, frame: &RadioFrame) {
            self.received.push(frame.clone());
        }

        fn transmit_done(&mut self, _: &RadioFrame, _: Option<&RadioFrame>, _: Result<()>) {}

        fn energy_scan_done(&mut self, max_rssi: i8) {
            self.scans.push(max_rssi);
        }
    }

    fn raw_frame() -> Bytes {
        let mut encoder = SpinelEncoder::new();
        encoder.write_data_wlen(&[0x41, 0x88]).unwrap();
        encoder.write_i8(-50);
        encoder.write_i8(-100);
        encoder.write_u16(0);
        encoder.open_struct();
        encoder.write_u8(11);
        encoder.write_u8(255);
        encoder.write_u64(0);
        encoder.close_struct().unwrap();
        encoder.open_struct();
        encoder.write_uint_packed(0).unwrap();
        encoder.close_struct().unwrap();
        encoder.finish()
    }

    fn dispatch(state: RadioState, promiscuous: bool, key: u32, payload: &[u8]) -> Recorder {
        let mut recorder = Recorder::default();
        let mut dispatch = Dispatch {
            state,
            promiscuous,
            handler: &mut recorder,
            reset: None,
        };
        dispatch.handle_value_is(key, payload);
        recorder
    }

    #[test]
    fn test_frames_delivered_while_receiving() {
        let recorder = dispatch(RadioState::Receive, false, prop::STREAM_RAW, &raw_frame());
        assert_eq!(recorder.received.len(), 1);
        assert_eq!(recorder.received[0].psdu, vec![0x41, 0x88]);
        assert_eq!(recorder.received[0].channel, 11);
    }

    #[test]
    fn test_frames_dropped_while_asleep() {
        let recorder = dispatch(RadioState::Sleep, false, prop::STREAM_RAW, &raw_frame());
        assert!(recorder.received.is_empty());
    }

    #[test]
    fn test_promiscuous_receives_while_asleep() {
        let recorder = dispatch(RadioState::Sleep, true, prop::STREAM_RAW, &raw_frame());
        assert_eq!(recorder.received.len(), 1);
    }

    #[test]
    fn test_energy_scan_result() {
        let recorder = dispatch(
            RadioState::Receive,
            false,
            prop::MAC_ENERGY_SCAN_RESULT,
            &[11, 0xC4],
        );
        assert_eq!(recorder.scans, vec![-60]);
    }

    #[test]
    fn test_reset_is_recorded() {
        let mut recorder = Recorder::default();
        let mut dispatch = Dispatch {
            state: RadioState::Sleep,
            promiscuous: false,
            handler: &mut recorder,
            reset: None,
        };
        dispatch.handle_reset(crate::protocol::status::RESET_SOFTWARE);
        assert_eq!(dispatch.reset, Some(114));
    }
}
