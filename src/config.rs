//! Session configuration.
//!
//! All durations are expressed in milliseconds when loaded from JSON:
//!
//! ```json
//! {
//!   "response_timeout_ms": 2000,
//!   "reset_delay_ms": 1000,
//!   "frame_cache_capacity": 4096,
//!   "uart_config": "115200",
//!   "writer": { "channel_capacity": 64 }
//! }
//! ```
//!
//! Missing fields take their defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::DEFAULT_FRAME_CACHE_CAPACITY;
use crate::writer::WriterConfig;

/// Default wait for a request's response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default settle time after the reset frame.
pub const DEFAULT_RESET_DELAY: Duration = Duration::from_millis(1000);

/// Default largest decoded Spinel frame.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 2048;

/// Default `stty` arguments for character devices.
pub const DEFAULT_UART_CONFIG: &str = "115200";

/// Default deadline for a radio transmit to complete.
pub const DEFAULT_TX_TIMEOUT: Duration = Duration::from_millis(5000);

/// Configuration for an [`NcpSpinel`](crate::NcpSpinel) session and the radio driver on top.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpinelConfig {
    /// How long a Get/Set/Insert/Remove waits for its response.
    #[serde(rename = "response_timeout_ms", with = "duration_ms")]
    pub response_timeout: Duration,

    /// Sleep after sending the reset frame.
    #[serde(rename = "reset_delay_ms", with = "duration_ms")]
    pub reset_delay: Duration,

    /// Bytes reserved for unsolicited frames.
    pub frame_cache_capacity: usize,

    /// Largest accepted frame after HDLC decoding.
    pub max_frame_size: usize,

    /// Arguments passed to `stty` when the path is a character device.
    pub uart_config: String,

    /// Deadline for a radio transmit to be confirmed.
    #[serde(rename = "tx_timeout_ms", with = "duration_ms")]
    pub tx_timeout: Duration,

    /// Writer task settings.
    pub writer: WriterConfig,
}

impl Default for SpinelConfig {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            reset_delay: DEFAULT_RESET_DELAY,
            frame_cache_capacity: DEFAULT_FRAME_CACHE_CAPACITY,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            uart_config: DEFAULT_UART_CONFIG.to_string(),
            tx_timeout: DEFAULT_TX_TIMEOUT,
            writer: WriterConfig::default(),
        }
    }
}

impl SpinelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_reset_delay(mut self, delay: Duration) -> Self {
        self.reset_delay = delay;
        self
    }

    pub fn with_frame_cache_capacity(mut self, capacity: usize) -> Self {
        self.frame_cache_capacity = capacity;
        self
    }

    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn with_uart_config(mut self, config: impl Into<String>) -> Self {
        self.uart_config = config.into();
        self
    }

    pub fn with_tx_timeout(mut self, timeout: Duration) -> Self {
        self.tx_timeout = timeout;
        self
    }

    pub fn with_writer(mut self, writer: WriterConfig) -> Self {
        self.writer = writer;
        self
    }
}

/// Serde adapter storing a `Duration` as whole milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
