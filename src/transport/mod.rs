//! Transport module - the byte link to the co-processor.
//!
//! Provides:
//! - UART character devices (configured through `stty`)
//! - Simulated co-processors spawned behind a pseudo-terminal

mod serial;

pub use serial::{open_link, open_pty, open_uart, Link, SerialStream};
