//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the co-processor link protocol:
//! - Spinel header byte, command ids, property keys and status codes
//! - HDLC-lite encoder and incremental decoder
//! - Spinel frame struct
//! - Frame cache for unsolicited frames

mod frame;
mod frame_cache;
mod hdlc;
mod wire_format;

pub use frame::SpinelFrame;
pub use frame_cache::{FrameCache, DEFAULT_FRAME_CACHE_CAPACITY};
pub use hdlc::{fcs16, HdlcDecoder, HdlcEncoder, ESCAPE_SEQUENCE, ESCAPE_XOR, FLAG_SEQUENCE};
pub use wire_format::{
    caps, cmd, log_level, next_tid, promiscuous_mode, prop, radio_caps, scan_state, status, Header,
    HEADER_FLAG, HEADER_IID_MASK, HEADER_IID_SHIFT, HEADER_TID_MASK, MAX_TID, MAX_UINT_PACKED,
    MD_FLAG_ACKED_FP, PROTOCOL_VERSION_MAJOR, PROTOCOL_VERSION_MINOR,
};
