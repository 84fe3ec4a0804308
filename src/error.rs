//! Error types for ncp-spinel.

use thiserror::Error;

use crate::protocol::status;

/// Main error type for all transport and radio operations.
#[derive(Debug, Error)]
pub enum SpinelError {
    /// I/O error on the co-processor link.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No transaction ID available, or a request of the same kind is outstanding.
    #[error("Busy")]
    Busy,

    /// No matching response arrived before the deadline.
    #[error("Response timeout")]
    ResponseTimeout,

    /// Malformed Spinel or HDLC payload.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Generic failure reported by the peer or the transport.
    #[error("Failed")]
    Failed,

    /// The frame or response was dropped.
    #[error("Dropped")]
    Drop,

    /// Insufficient buffer space.
    #[error("No buffers")]
    NoBufs,

    /// Property or list entry not found.
    #[error("Not found")]
    NotFound,

    /// Operation not valid in the current state.
    #[error("Invalid state")]
    InvalidState,

    /// Invalid argument.
    #[error("Invalid arguments")]
    InvalidArgs,

    /// The peer does not implement the operation.
    #[error("Not implemented")]
    NotImplemented,

    /// Transmitted frame was not acknowledged.
    #[error("No ack")]
    NoAck,

    /// Transmission failed CCA.
    #[error("Channel access failure")]
    ChannelAccessFailure,

    /// Operation already in progress.
    #[error("Already")]
    Already,

    /// The radio lacks the capability for the operation.
    #[error("Not capable")]
    NotCapable,

    /// The co-processor speaks an incompatible protocol.
    #[error("Incompatible co-processor: {0}")]
    Incompatible(String),

    /// Stack-native status code forwarded by the peer.
    #[error("Peer status {0}")]
    Status(u32),

    /// The co-processor link failed; the session must be re-opened.
    #[error("Link lost")]
    LinkLost,

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,
}

impl SpinelError {
    /// Map a Spinel status code to a result.
    pub fn from_status(code: u32) -> Result<()> {
        let err = match code {
            status::OK => return Ok(()),
            status::FAILURE => SpinelError::Failed,
            status::DROPPED => SpinelError::Drop,
            status::NOMEM => SpinelError::NoBufs,
            status::BUSY => SpinelError::Busy,
            status::PARSE_ERROR => SpinelError::Parse(format!("peer status {}", code)),
            status::INVALID_ARGUMENT => SpinelError::InvalidArgs,
            status::UNIMPLEMENTED => SpinelError::NotImplemented,
            status::INVALID_STATE => SpinelError::InvalidState,
            status::NO_ACK => SpinelError::NoAck,
            status::CCA_FAILURE => SpinelError::ChannelAccessFailure,
            status::ALREADY => SpinelError::Already,
            status::PROP_NOT_FOUND | status::ITEM_NOT_FOUND => SpinelError::NotFound,
            c if (status::STACK_NATIVE_BEGIN..=status::STACK_NATIVE_END).contains(&c) => {
                SpinelError::Status(c - status::STACK_NATIVE_BEGIN)
            }
            _ => SpinelError::Failed,
        };
        Err(err)
    }

    /// Shorthand for a parse error.
    pub(crate) fn parse(msg: impl Into<String>) -> Self {
        SpinelError::Parse(msg.into())
    }
}

/// Result type alias using SpinelError.
pub type Result<T> = std::result::Result<T, SpinelError>;
