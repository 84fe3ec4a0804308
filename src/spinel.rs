//! Spinel transaction layer.
//!
//! [`NcpSpinel`] owns one co-processor session:
//! 1. Split the link into a reader task and a writer task
//! 2. Send the `RESET` frame and let the peer settle
//! 3. Match responses to requests by TID
//! 4. Cache unsolicited frames until [`NcpSpinel::process`] drains them
//!
//! At most one property request and one raw-stream transmit are outstanding
//! at any time. A second request of either kind fails with `Busy`.
//!
//! # Example
//!
//! ```ignore
//! use ncp_spinel::{codec::Value, protocol::prop, NcpSpinel, SpinelConfig};
//!
//! let ncp = NcpSpinel::open("/dev/ttyACM0".as_ref(), SpinelConfig::default()).await?;
//! ncp.set(prop::PHY_ENABLED, &[Value::Bool(true)]).await?;
//! let sensitivity = ncp.get(prop::PHY_RX_SENSITIVITY).await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::process::Child;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::codec::{decode_values, encode_values, Kind, SpinelDecoder, Value};
use crate::config::SpinelConfig;
use crate::error::{Result, SpinelError};
use crate::protocol::{
    cmd, log_level, prop, status, FrameCache, HdlcDecoder, HdlcEncoder, SpinelFrame,
};
use crate::radio::RadioFrame;
use crate::tid::TidPool;
use crate::transport::open_link;
use crate::writer::{spawn_writer_task, WriterHandle};

/// Read buffer size for the link.
const READ_BUFFER_SIZE: usize = 4096;

/// Receiver of unsolicited frames drained by [`NcpSpinel::process`].
///
/// `LAST_STATUS`, `STREAM_DEBUG` and `STREAM_LOG` reports are handled by the
/// session itself; every other `VALUE_IS` notification reaches
/// [`handle_value_is`](Self::handle_value_is).
pub trait NotificationHandler {
    /// A property value reported by the co-processor.
    fn handle_value_is(&mut self, key: u32, payload: &[u8]);

    /// The co-processor announced a reset with the given status.
    fn handle_reset(&mut self, _status: u32) {}
}

/// Result of a raw-stream transmit: the ACK frame, if one was received.
pub type TransmitResult = Result<Option<RadioFrame>>;

/// What completes the outstanding property request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    /// A `Get`: any value report on the key.
    Value,
    /// A `Set`/`Insert`/`Remove`: this exact report command.
    Command(u32),
}

struct Waiting {
    tid: u8,
    key: u32,
    expect: Expect,
    reply: oneshot::Sender<Result<Bytes>>,
}

struct StreamRequest {
    tid: u8,
    reply: oneshot::Sender<TransmitResult>,
}

/// State shared between the session and its reader task.
struct TransactionState {
    tids: TidPool,
    waiting: Option<Waiting>,
    stream: Option<StreamRequest>,
    cache: FrameCache,
    link_lost: bool,
}

struct Shared {
    state: Mutex<TransactionState>,
    /// Signalled when a frame is cached or the link is lost.
    frames: Notify,
}

impl Shared {
    fn new(cache_capacity: usize) -> Self {
        Self {
            state: Mutex::new(TransactionState {
                tids: TidPool::new(),
                waiting: None,
                stream: None,
                cache: FrameCache::with_capacity(cache_capacity),
                link_lost: false,
            }),
            frames: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TransactionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Route one decoded HDLC frame.
    fn handle_hdlc_frame(&self, bytes: Bytes) {
        let frame = match SpinelFrame::decode(&bytes) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Error handling hdlc frame: {}", e);
                return;
            }
        };

        if frame.header.is_unsolicited() {
            let pushed = self.lock().cache.push(&bytes);
            match pushed {
                Ok(()) => self.frames.notify_one(),
                Err(e) => tracing::warn!(len = bytes.len(), "Dropped unsolicited frame: {}", e),
            }
        } else {
            self.handle_response(frame);
        }
    }

    fn handle_response(&self, frame: SpinelFrame) {
        if !cmd::is_value_report(frame.command) {
            tracing::warn!(
                command = frame.command,
                "Error processing response: unexpected command"
            );
            return;
        }

        let tid = frame.tid();
        let mut state = self.lock();

        if state.waiting.as_ref().map(|w| w.tid) == Some(tid) {
            let Some(waiting) = state.waiting.take() else {
                return;
            };
            state.tids.free(tid);
            drop(state);

            let result = handle_result(waiting.key, waiting.expect, &frame);
            if let Err(e) = &result {
                tracing::warn!(key = waiting.key, "Error processing result: {}", e);
            }
            let _ = waiting.reply.send(result);
        } else if state.stream.as_ref().map(|s| s.tid) == Some(tid) {
            let Some(stream) = state.stream.take() else {
                return;
            };
            state.tids.free(tid);
            drop(state);

            let _ = stream.reply.send(handle_transmit_done(&frame));
        } else {
            tracing::warn!(tid, key = frame.key, "Unexpected transaction");
        }
    }

    /// Fail everything outstanding and refuse new requests.
    fn mark_link_lost(&self) {
        let mut state = self.lock();
        if state.link_lost {
            return;
        }
        state.link_lost = true;
        state.tids.clear();
        let waiting = state.waiting.take();
        let stream = state.stream.take();
        drop(state);

        if let Some(waiting) = waiting {
            let _ = waiting.reply.send(Err(SpinelError::LinkLost));
        }
        if let Some(stream) = stream {
            let _ = stream.reply.send(Err(SpinelError::LinkLost));
        }
        self.frames.notify_one();
    }
}

/// Resolve the outstanding request from its response frame.
fn handle_result(key: u32, expect: Expect, frame: &SpinelFrame) -> Result<Bytes> {
    if frame.key == key {
        return match expect {
            Expect::Value => Ok(frame.payload.clone()),
            Expect::Command(command) if command == frame.command => Ok(frame.payload.clone()),
            Expect::Command(_) => Err(SpinelError::Drop),
        };
    }

    if frame.key == prop::LAST_STATUS {
        let status = SpinelDecoder::new(&frame.payload).read_uint_packed()?;
        return SpinelError::from_status(status).map(|()| Bytes::new());
    }

    Err(SpinelError::Drop)
}

/// Decode the response to a raw-stream transmit.
fn handle_transmit_done(frame: &SpinelFrame) -> TransmitResult {
    if frame.command != cmd::PROP_VALUE_IS || frame.key != prop::LAST_STATUS {
        tracing::warn!(
            command = frame.command,
            key = frame.key,
            "Unexpected transmit done response"
        );
        return Err(SpinelError::Failed);
    }

    let mut decoder = SpinelDecoder::new(&frame.payload);
    let status = decoder.read_uint_packed()?;
    SpinelError::from_status(status)?;

    let frame_pending = decoder.read_bool()?;
    if decoder.is_empty() {
        return Ok(None);
    }

    let mut ack = RadioFrame::parse_received(decoder.remaining())?;
    ack.rx.acked_with_frame_pending = frame_pending;
    Ok(Some(ack))
}

/// Releases the waiting slot if a request future is dropped mid-flight.
struct WaitingGuard<'a> {
    shared: &'a Shared,
    tid: u8,
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        if state.waiting.as_ref().map(|w| w.tid) == Some(self.tid) {
            state.waiting = None;
            state.tids.free(self.tid);
        }
    }
}

/// An in-flight raw-stream transmit.
///
/// Resolves once the co-processor reports transmit done. Dropping it does not
/// release the stream slot; use [`NcpSpinel::cancel_transmit`].
#[derive(Debug)]
pub struct PendingTransmit {
    rx: oneshot::Receiver<TransmitResult>,
}

impl PendingTransmit {
    /// Take the result if it has already arrived.
    pub fn try_result(&mut self) -> Option<TransmitResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(SpinelError::LinkLost)),
        }
    }
}

impl Future for PendingTransmit {
    type Output = TransmitResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(SpinelError::LinkLost)))
    }
}

/// A session with one co-processor.
pub struct NcpSpinel {
    shared: Arc<Shared>,
    writer: WriterHandle,
    config: SpinelConfig,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<Result<()>>,
    child: Option<Child>,
}

impl NcpSpinel {
    /// Open the co-processor at `path` and reset it.
    ///
    /// A character device is configured with `config.uart_config`; a regular
    /// file is spawned behind a pseudo-terminal.
    pub async fn open(path: &Path, config: SpinelConfig) -> Result<Self> {
        let link = open_link(path, &config.uart_config).await?;
        let mut ncp = Self::start(link.stream, config);
        ncp.child = link.child;
        ncp.reset().await?;
        Ok(ncp)
    }

    /// Run a session over an already opened byte stream and reset the peer.
    pub async fn connect<S>(stream: S, config: SpinelConfig) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let ncp = Self::start(stream, config);
        ncp.reset().await?;
        Ok(ncp)
    }

    fn start<S>(stream: S, config: SpinelConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, write_half) = tokio::io::split(stream);
        let (writer, writer_task) = spawn_writer_task(write_half, &config.writer);

        let shared = Arc::new(Shared::new(config.frame_cache_capacity));
        let reader_task = tokio::spawn(Self::read_loop(
            reader,
            shared.clone(),
            config.max_frame_size,
        ));

        Self {
            shared,
            writer,
            config,
            reader_task,
            writer_task,
            child: None,
        }
    }

    /// Decode HDLC frames off the link until it fails or closes.
    async fn read_loop<R: AsyncRead + Unpin>(
        mut reader: R,
        shared: Arc<Shared>,
        max_frame_size: usize,
    ) {
        let mut decoder = HdlcDecoder::with_max_frame_size(max_frame_size);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => {
                    tracing::warn!("Co-processor link closed");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    tracing::error!("Co-processor link read error: {}", e);
                    break;
                }
            };
            tracing::trace!(len = n, "Link read");

            for result in decoder.decode(&buf[..n]) {
                match result {
                    Ok(frame) => shared.handle_hdlc_frame(frame),
                    Err(e) => tracing::warn!("Error decoding hdlc frame: {}", e),
                }
            }
        }

        shared.mark_link_lost();
    }

    /// Send `RESET` and wait `reset_delay` for the peer to reboot.
    pub async fn reset(&self) -> Result<()> {
        let frame = SpinelFrame::reset().encode()?;
        self.write_frame(&frame).await?;
        tracing::info!("Sent co-processor reset");
        tokio::time::sleep(self.config.reset_delay).await;
        Ok(())
    }

    async fn write_frame(&self, frame: &[u8]) -> Result<()> {
        self.writer
            .send_confirmed(HdlcEncoder::encode(frame))
            .await
            .map_err(|e| {
                tracing::warn!("Error sending frame: {}", e);
                SpinelError::Failed
            })
    }

    /// Session configuration.
    pub fn config(&self) -> &SpinelConfig {
        &self.config
    }

    /// Check if the link has failed.
    pub fn is_link_lost(&self) -> bool {
        self.shared.lock().link_lost
    }

    /// Check if unsolicited frames are waiting for [`process`](Self::process).
    pub fn is_frame_cached(&self) -> bool {
        !self.shared.lock().cache.is_empty()
    }

    /// Suspend until an unsolicited frame is cached.
    ///
    /// Fails with `LinkLost` once the link is gone and the cache is drained.
    pub async fn wait_for_frames(&self) -> Result<()> {
        loop {
            {
                let state = self.shared.lock();
                if !state.cache.is_empty() {
                    return Ok(());
                }
                if state.link_lost {
                    return Err(SpinelError::LinkLost);
                }
            }
            self.shared.frames.notified().await;
        }
    }

    /// Get a property's raw payload.
    pub async fn get(&self, key: u32) -> Result<Bytes> {
        self.request(cmd::PROP_VALUE_GET, key, Bytes::new(), Expect::Value)
            .await
    }

    /// Get a property and decode it as `kinds`.
    pub async fn get_values(&self, key: u32, kinds: &[Kind]) -> Result<Vec<Value>> {
        let payload = self.get(key).await?;
        decode_values(&payload, kinds)
    }

    /// Set a property, waiting for the echoed value.
    pub async fn set(&self, key: u32, values: &[Value]) -> Result<()> {
        let payload = encode_values(values)?;
        self.request(
            cmd::PROP_VALUE_SET,
            key,
            payload,
            Expect::Command(cmd::PROP_VALUE_IS),
        )
        .await
        .map(drop)
    }

    /// Insert values into a list property.
    pub async fn insert(&self, key: u32, values: &[Value]) -> Result<()> {
        let payload = encode_values(values)?;
        self.request(
            cmd::PROP_VALUE_INSERT,
            key,
            payload,
            Expect::Command(cmd::PROP_VALUE_INSERTED),
        )
        .await
        .map(drop)
    }

    /// Remove values from a list property.
    pub async fn remove(&self, key: u32, values: &[Value]) -> Result<()> {
        let payload = encode_values(values)?;
        self.request(
            cmd::PROP_VALUE_REMOVE,
            key,
            payload,
            Expect::Command(cmd::PROP_VALUE_REMOVED),
        )
        .await
        .map(drop)
    }

    async fn request(&self, command: u32, key: u32, payload: Bytes, expect: Expect) -> Result<Bytes> {
        let (reply, mut rx) = oneshot::channel();
        let tid = {
            let mut state = self.shared.lock();
            if state.link_lost {
                return Err(SpinelError::LinkLost);
            }
            if state.waiting.is_some() {
                return Err(SpinelError::Busy);
            }
            let tid = state.tids.allocate().ok_or(SpinelError::Busy)?;
            state.waiting = Some(Waiting {
                tid,
                key,
                expect,
                reply,
            });
            tid
        };
        let _guard = WaitingGuard {
            shared: &self.shared,
            tid,
        };

        let deadline = Instant::now() + self.config.response_timeout;
        let frame = SpinelFrame::new(tid, command, key, payload).encode()?;
        tracing::debug!(tid, command, key, "Sending request");
        self.write_frame(&frame).await?;

        match tokio::time::timeout_at(deadline, &mut rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SpinelError::LinkLost),
            Err(_) => {
                // The reader may have resolved the slot right at the deadline.
                if let Ok(result) = rx.try_recv() {
                    return result;
                }
                tracing::warn!(tid, key, "Error waiting response: {}", SpinelError::ResponseTimeout);
                Err(SpinelError::ResponseTimeout)
            }
        }
    }

    /// Send a raw radio frame on `STREAM_RAW` without waiting for completion.
    pub async fn transmit(&self, frame: &RadioFrame) -> Result<PendingTransmit> {
        let payload = frame.encode_transmit()?;
        let (reply, rx) = oneshot::channel();
        let tid = {
            let mut state = self.shared.lock();
            if state.link_lost {
                return Err(SpinelError::LinkLost);
            }
            if state.stream.is_some() {
                return Err(SpinelError::Busy);
            }
            let tid = state.tids.allocate().ok_or(SpinelError::Busy)?;
            state.stream = Some(StreamRequest { tid, reply });
            tid
        };

        let encoded = SpinelFrame::new(tid, cmd::PROP_VALUE_SET, prop::STREAM_RAW, payload).encode();
        let sent = match encoded {
            Ok(bytes) => self.write_frame(&bytes).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            self.release_stream(tid);
            return Err(e);
        }

        tracing::debug!(tid, channel = frame.channel, len = frame.psdu.len(), "Transmit sent");
        Ok(PendingTransmit { rx })
    }

    /// Give up on the outstanding transmit and free its TID.
    pub fn cancel_transmit(&self) {
        let mut state = self.shared.lock();
        if let Some(stream) = state.stream.take() {
            state.tids.free(stream.tid);
        }
    }

    fn release_stream(&self, tid: u8) {
        let mut state = self.shared.lock();
        if state.stream.as_ref().map(|s| s.tid) == Some(tid) {
            state.stream = None;
            state.tids.free(tid);
        }
    }

    /// Check if a raw-stream transmit is outstanding.
    pub fn is_transmit_pending(&self) -> bool {
        self.shared.lock().stream.is_some()
    }

    /// Drain cached unsolicited frames, oldest first. Returns the number handled.
    pub fn process(&self, handler: &mut dyn NotificationHandler) -> usize {
        let mut handled = 0;
        loop {
            let Some(frame) = self.shared.lock().cache.peek() else {
                break;
            };
            self.handle_notification(&frame, handler);
            self.shared.lock().cache.shift();
            handled += 1;
        }
        handled
    }

    fn handle_notification(&self, bytes: &Bytes, handler: &mut dyn NotificationHandler) {
        let frame = match SpinelFrame::decode(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Error processing notification: {}", e);
                return;
            }
        };

        match frame.command {
            cmd::PROP_VALUE_IS => {
                if let Err(e) = self.handle_value_is(frame.key, &frame.payload, handler) {
                    tracing::warn!(key = frame.key, "Error processing notification: {}", e);
                }
            }
            cmd::PROP_VALUE_INSERTED | cmd::PROP_VALUE_REMOVED => {
                tracing::info!(command = frame.command, key = frame.key, "Ignored command");
            }
            command => {
                tracing::warn!(command, "Error processing notification: unexpected command");
            }
        }
    }

    fn handle_value_is(
        &self,
        key: u32,
        payload: &[u8],
        handler: &mut dyn NotificationHandler,
    ) -> Result<()> {
        match key {
            prop::LAST_STATUS => {
                let status = SpinelDecoder::new(payload).read_uint_packed()?;
                if status::is_reset(status) {
                    tracing::warn!(status, "Co-processor reset");
                    handler.handle_reset(status);
                } else {
                    tracing::info!(status, "Co-processor last status");
                }
            }
            prop::STREAM_DEBUG => {
                let data = SpinelDecoder::new(payload).read_data();
                tracing::debug!("NCP => {}", String::from_utf8_lossy(data).trim_end());
            }
            prop::STREAM_LOG => {
                let mut decoder = SpinelDecoder::new(payload);
                let text = decoder.read_utf8()?;
                let level = decoder.read_u8()?;
                emit_log(level, text);
            }
            _ => handler.handle_value_is(key, payload),
        }
        Ok(())
    }

    /// Stop both tasks, fail outstanding requests and reap the simulator child.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.reader_task.abort();
        self.writer_task.abort();
        self.shared.mark_link_lost();

        if let Some(mut child) = self.child.take() {
            child.kill().await?;
            tracing::info!("Co-processor process stopped");
        }
        Ok(())
    }
}

impl Drop for NcpSpinel {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.writer_task.abort();
    }
}

/// Re-emit a co-processor log line at its tracing level.
fn emit_log(level: u8, text: &str) {
    match level {
        log_level::EMERG | log_level::ALERT | log_level::CRIT => tracing::error!("NCP => {}", text),
        log_level::ERR | log_level::WARN => tracing::warn!("NCP => {}", text),
        log_level::NOTICE | log_level::INFO => tracing::info!("NCP => {}", text),
        _ => tracing::debug!("NCP => {}", text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::SpinelEncoder;
    use crate::protocol::Header;

    fn response(tid: u8, command: u32, key: u32, payload: &[u8]) -> SpinelFrame {
        SpinelFrame {
            header: Header::new(tid),
            command,
            key,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    fn status_payload(code: u32) -> Vec<u8> {
        let mut encoder = SpinelEncoder::new();
        encoder.write_uint_packed(code).unwrap();
        encoder.finish().to_vec()
    }

    #[test]
    fn test_get_completes_with_payload() {
        let frame = response(1, cmd::PROP_VALUE_IS, prop::PHY_CHAN, &[11]);
        let result = handle_result(prop::PHY_CHAN, Expect::Value, &frame).unwrap();
        assert_eq!(&result[..], &[11]);
    }

    #[test]
    fn test_set_requires_expected_command() {
        let frame = response(1, cmd::PROP_VALUE_INSERTED, prop::PHY_CHAN, &[11]);
        let result = handle_result(
            prop::PHY_CHAN,
            Expect::Command(cmd::PROP_VALUE_IS),
            &frame,
        );
        assert!(matches!(result, Err(SpinelError::Drop)));
    }

    #[test]
    fn test_last_status_maps_to_error() {
        let frame = response(
            1,
            cmd::PROP_VALUE_IS,
            prop::LAST_STATUS,
            &status_payload(status::INVALID_ARGUMENT),
        );
        let result = handle_result(prop::PHY_CHAN, Expect::Value, &frame);
        assert!(matches!(result, Err(SpinelError::InvalidArgs)));
    }

    #[test]
    fn test_last_status_ok_completes_set() {
        let frame = response(
            1,
            cmd::PROP_VALUE_IS,
            prop::LAST_STATUS,
            &status_payload(status::OK),
        );
        let result = handle_result(
            prop::PHY_CHAN,
            Expect::Command(cmd::PROP_VALUE_IS),
            &frame,
        );
        assert!(result.unwrap().is_empty());
    }

    #[test]
    fn test_other_key_is_dropped() {
        let frame = response(1, cmd::PROP_VALUE_IS, prop::PHY_TX_POWER, &[0]);
        let result = handle_result(prop::PHY_CHAN, Expect::Value, &frame);
        assert!(matches!(result, Err(SpinelError::Drop)));
    }

    #[test]
    fn test_transmit_done_without_ack() {
        let mut payload = status_payload(status::OK);
        payload.push(0);
        let frame = response(2, cmd::PROP_VALUE_IS, prop::LAST_STATUS, &payload);
        assert_eq!(handle_transmit_done(&frame).unwrap(), None);
    }

    #[test]
    fn test_transmit_done_with_ack() {
        let mut encoder = SpinelEncoder::new();
        encoder.write_uint_packed(status::OK).unwrap();
        encoder.write_bool(true);
        encoder.write_data_wlen(&[0x02, 0x00, 0x05]).unwrap();
        encoder.write_i8(-40);
        encoder.write_i8(-100);
        encoder.write_u16(0);
        encoder.open_struct();
        encoder.write_u8(15);
        encoder.write_u8(200);
        encoder.write_u64(1234);
        encoder.close_struct().unwrap();
        encoder.open_struct();
        encoder.write_uint_packed(0).unwrap();
        encoder.close_struct().unwrap();

        let frame = response(2, cmd::PROP_VALUE_IS, prop::LAST_STATUS, &encoder.finish());
        let ack = handle_transmit_done(&frame).unwrap().unwrap();
        assert_eq!(ack.psdu, vec![0x02, 0x00, 0x05]);
        assert_eq!(ack.channel, 15);
        assert_eq!(ack.rx.rssi, -40);
        assert!(ack.rx.acked_with_frame_pending);
    }

    #[test]
    fn test_transmit_done_status_error() {
        let frame = response(
            2,
            cmd::PROP_VALUE_IS,
            prop::LAST_STATUS,
            &status_payload(status::NO_ACK),
        );
        assert!(matches!(
            handle_transmit_done(&frame),
            Err(SpinelError::NoAck)
        ));
    }

    #[test]
    fn test_transmit_done_missing_frame_pending() {
        let frame = response(
            2,
            cmd::PROP_VALUE_IS,
            prop::LAST_STATUS,
            &status_payload(status::OK),
        );
        assert!(matches!(
            handle_transmit_done(&frame),
            Err(SpinelError::Parse(_))
        ));
    }

    #[test]
    fn test_transmit_done_wrong_key() {
        let frame = response(2, cmd::PROP_VALUE_IS, prop::STREAM_RAW, &[]);
        assert!(matches!(
            handle_transmit_done(&frame),
            Err(SpinelError::Failed)
        ));
    }

    #[test]
    fn test_unmatched_response_is_dropped() {
        let shared = Shared::new(256);
        let (reply, mut rx) = oneshot::channel();
        {
            let mut state = shared.lock();
            let tid = state.tids.allocate().unwrap();
            state.waiting = Some(Waiting {
                tid,
                key: prop::PHY_CHAN,
                expect: Expect::Value,
                reply,
            });
        }

        shared.handle_response(response(5, cmd::PROP_VALUE_IS, prop::PHY_CHAN, &[11]));
        assert!(rx.try_recv().is_err());
        assert!(shared.lock().waiting.is_some());

        shared.handle_response(response(1, cmd::PROP_VALUE_IS, prop::PHY_CHAN, &[11]));
        assert_eq!(&rx.try_recv().unwrap().unwrap()[..], &[11]);
        let state = shared.lock();
        assert!(state.waiting.is_none());
        assert!(!state.tids.is_in_use(1));
    }

    #[test]
    fn test_unsolicited_frames_are_cached() {
        let shared = Shared::new(256);
        let frame = SpinelFrame::new(0, cmd::PROP_VALUE_IS, prop::STREAM_DEBUG, Bytes::from_static(b"hi"))
            .encode()
            .unwrap();
        shared.handle_hdlc_frame(frame.clone());
        assert_eq!(shared.lock().cache.peek(), Some(frame));
    }

    #[test]
    fn test_link_lost_fails_outstanding() {
        let shared = Shared::new(256);
        let (reply, mut rx) = oneshot::channel();
        {
            let mut state = shared.lock();
            let tid = state.tids.allocate().unwrap();
            state.waiting = Some(Waiting {
                tid,
                key: prop::PHY_CHAN,
                expect: Expect::Value,
                reply,
            });
        }

        shared.mark_link_lost();
        assert!(matches!(rx.try_recv().unwrap(), Err(SpinelError::LinkLost)));
        assert!(shared.lock().link_lost);
        assert_eq!(shared.lock().tids.in_flight(), 0);
    }
}
