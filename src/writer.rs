//! Dedicated writer task for the co-processor link.
//!
//! Callers never touch the write half of the link directly. They hand
//! HDLC-encoded frames to a writer task over an mpsc channel, which batches
//! whatever is queued into a single vectored write.
//!
//! # Architecture
//!
//! ```text
//! Request path ──┐
//! Transmit path ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► UART / PTY
//! Reset ─────────┘
//! ```
//!
//! A frame may carry a oneshot that is resolved once its bytes have been
//! flushed, so the request path can report a failed write as such.

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::duration_ms;
use crate::error::{Result, SpinelError};

/// Default maximum pending frames before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 64;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(1);

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 16;

/// An HDLC-encoded frame ready to be written to the link.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Wire bytes, flags and FCS included.
    pub data: Bytes,
    /// Resolved with `true` once written and flushed, `false` on failure.
    written: Option<oneshot::Sender<bool>>,
}

impl OutboundFrame {
    /// Create a frame whose write outcome is reported on the returned receiver.
    pub fn confirmed(data: Bytes) -> (Self, oneshot::Receiver<bool>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                data,
                written: Some(tx),
            },
            rx,
        )
    }

    /// Size of this frame on the wire.
    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    fn complete(self, ok: bool) {
        if let Some(tx) = self.written {
            let _ = tx.send(ok);
        }
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Maximum pending frames before backpressure kicks in.
    pub max_pending_frames: usize,
    /// Channel capacity for frame queue.
    pub channel_capacity: usize,
    /// Timeout when waiting for backpressure to clear.
    #[serde(rename = "backpressure_timeout_ms", with = "duration_ms")]
    pub backpressure_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// This is cheaply cloneable.
#[derive(Clone)]
pub struct WriterHandle {
    /// Channel sender for frames.
    tx: mpsc::Sender<OutboundFrame>,
    /// Pending frame count (for backpressure).
    pending: Arc<AtomicUsize>,
    /// Maximum pending frames.
    max_pending: usize,
    /// Backpressure timeout.
    timeout: Duration,
}

impl WriterHandle {
    fn new(
        tx: mpsc::Sender<OutboundFrame>,
        pending: Arc<AtomicUsize>,
        max_pending: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            tx,
            pending,
            max_pending,
            timeout,
        }
    }

    /// Queue a frame for the writer task.
    ///
    /// Waits while backpressure is active, failing with `NoBufs` after the
    /// configured timeout.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        if self.pending.load(Ordering::Acquire) >= self.max_pending {
            self.wait_for_backpressure().await?;
        }

        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.send(frame).await.map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            SpinelError::ConnectionClosed
        })
    }

    /// Queue a frame and wait until it has been written.
    pub async fn send_confirmed(&self, data: Bytes) -> Result<()> {
        let (frame, written) = OutboundFrame::confirmed(data);
        self.send(frame).await?;
        match written.await {
            Ok(true) => Ok(()),
            Ok(false) => Err(SpinelError::Failed),
            Err(_) => Err(SpinelError::ConnectionClosed),
        }
    }

    async fn wait_for_backpressure(&self) -> Result<()> {
        let start = Instant::now();
        let check_interval = Duration::from_millis(1);

        loop {
            if self.pending.load(Ordering::Acquire) < self.max_pending {
                return Ok(());
            }

            if start.elapsed() > self.timeout {
                tracing::warn!(pending = self.pending_count(), "Writer backpressure timeout");
                return Err(SpinelError::NoBufs);
            }

            tokio::time::sleep(check_interval).await;
        }
    }

    /// Get current pending frame count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task ends cleanly when every handle is dropped, or with an error
/// when the link rejects a write.
pub fn spawn_writer_task<W>(
    writer: W,
    config: &WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(
        tx,
        pending.clone(),
        config.max_pending_frames.max(1),
        config.backpressure_timeout,
    );

    let task = tokio::spawn(writer_loop(rx, writer, pending));

    (handle, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(f) => f,
            None => return Ok(()),
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        let result = write_batch(&mut writer, &batch).await;
        pending.fetch_sub(batch_size, Ordering::Release);

        let ok = result.is_ok();
        for frame in batch {
            frame.complete(ok);
        }

        if let Err(e) = result {
            tracing::error!("Link write failed: {}", e);
            // Fail whatever was queued behind the broken batch.
            rx.close();
            while let Ok(frame) = rx.try_recv() {
                pending.fetch_sub(1, Ordering::Release);
                frame.complete(false);
            }
            return Err(e);
        }
    }
}

/// Write a batch of frames with one vectored write where possible.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(|f| f.size()).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(SpinelError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for remaining data after partial write.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut skipped = 0;

    for frame in batch {
        let start = skipped;
        let end = skipped + frame.data.len();

        if skip_bytes < end && !frame.data.is_empty() {
            let start_in_frame = skip_bytes.saturating_sub(start);
            slices.push(IoSlice::new(&frame.data[start_in_frame..]));
        }
        skipped = end;
    }

    slices
}
