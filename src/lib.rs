//! # ncp-spinel
//!
//! Host-side driver for an IEEE 802.15.4 radio co-processor speaking Spinel
//! over HDLC-lite.
//!
//! ## Architecture
//!
//! - **Transport**: UART character device or a simulator spawned behind a pty
//! - **Transaction layer** ([`NcpSpinel`]): TID matching, response timeouts,
//!   and a ring-buffer cache for unsolicited frames
//! - **Radio adapter** ([`RadioSpinel`]): radio state machine on top of
//!   Spinel property operations
//!
//! ## Example
//!
//! ```ignore
//! use ncp_spinel::{RadioSpinel, SpinelConfig};
//!
//! #[tokio::main]
//! async fn main() -> ncp_spinel::Result<()> {
//!     let mut radio = RadioSpinel::open("/dev/ttyACM0".as_ref(), SpinelConfig::default()).await?;
//!     radio.enable().await?;
//!     radio.receive(11).await?;
//!
//!     let mut handler = MyHandler::default();
//!     loop {
//!         radio.wait_for_event().await?;
//!         radio.process(&mut handler).await?;
//!     }
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod radio;
pub mod transport;
pub mod writer;

mod spinel;
mod tid;

pub use codec::{Kind, Value};
pub use config::SpinelConfig;
pub use error::{Result, SpinelError};
pub use radio::{RadioFrame, RadioHandler, RadioSpinel, RadioState};
pub use spinel::{NcpSpinel, NotificationHandler, PendingTransmit, TransmitResult};
