//! Spinel wire format: header byte, command ids, property keys, status codes.
//!
//! Header byte layout:
//! ```text
//! ┌──────┬──────────┬──────────┬──────────────┐
//! │ bit7 │ bit6     │ bits 5:4 │ bits 3:0     │
//! │ FLAG │ reserved │ IID      │ TID          │
//! └──────┴──────────┴──────────┴──────────────┘
//! ```
//!
//! TID 0 marks a frame that expects no response (or, inbound, an unsolicited
//! notification). TIDs 1..=15 tag requests and their responses.

use crate::error::{Result, SpinelError};

/// Header flag bit, must be set on every frame.
pub const HEADER_FLAG: u8 = 0x80;

/// Interface ID shift within the header byte.
pub const HEADER_IID_SHIFT: u8 = 4;

/// Interface ID mask within the header byte.
pub const HEADER_IID_MASK: u8 = 0x03 << HEADER_IID_SHIFT;

/// Transaction ID mask within the header byte.
pub const HEADER_TID_MASK: u8 = 0x0F;

/// Largest transaction ID.
pub const MAX_TID: u8 = 15;

/// Maximum value of a packed unsigned integer (21 bits).
pub const MAX_UINT_PACKED: u32 = 2_097_151;

/// Spinel protocol version spoken by this host.
pub const PROTOCOL_VERSION_MAJOR: u32 = 4;
/// Spinel protocol minor version spoken by this host.
pub const PROTOCOL_VERSION_MINOR: u32 = 3;

/// Decoded header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Interface ID (only 0 is accepted).
    pub iid: u8,
    /// Transaction ID (0 = unsolicited / no response expected).
    pub tid: u8,
}

impl Header {
    /// Create a header for interface 0.
    pub fn new(tid: u8) -> Self {
        Self {
            iid: 0,
            tid: tid & HEADER_TID_MASK,
        }
    }

    /// Encode to the wire byte.
    ///
    /// ```
    /// use ncp_spinel::protocol::Header;
    ///
    /// assert_eq!(Header::new(0).encode(), 0x80);
    /// assert_eq!(Header::new(3).encode(), 0x83);
    /// ```
    #[inline]
    pub fn encode(&self) -> u8 {
        HEADER_FLAG | ((self.iid << HEADER_IID_SHIFT) & HEADER_IID_MASK) | (self.tid & HEADER_TID_MASK)
    }

    /// Decode a wire byte, rejecting bytes without the header flag.
    pub fn decode(byte: u8) -> Result<Self> {
        if byte & HEADER_FLAG != HEADER_FLAG {
            return Err(SpinelError::parse(format!(
                "Header 0x{:02x} lacks flag bit",
                byte
            )));
        }
        Ok(Self {
            iid: (byte & HEADER_IID_MASK) >> HEADER_IID_SHIFT,
            tid: byte & HEADER_TID_MASK,
        })
    }

    /// Check if this frame is unsolicited (TID 0).
    #[inline]
    pub fn is_unsolicited(&self) -> bool {
        self.tid == 0
    }
}

/// Next TID in the 1..=15 cycle.
#[inline]
pub fn next_tid(tid: u8) -> u8 {
    if tid >= MAX_TID {
        1
    } else {
        tid + 1
    }
}

/// Command identifiers.
pub mod cmd {
    pub const NOOP: u32 = 0;
    pub const RESET: u32 = 1;
    pub const PROP_VALUE_GET: u32 = 2;
    pub const PROP_VALUE_SET: u32 = 3;
    pub const PROP_VALUE_INSERT: u32 = 4;
    pub const PROP_VALUE_REMOVE: u32 = 5;
    pub const PROP_VALUE_IS: u32 = 6;
    pub const PROP_VALUE_INSERTED: u32 = 7;
    pub const PROP_VALUE_REMOVED: u32 = 8;

    /// Check if the command carries a property value (IS / INSERTED / REMOVED).
    #[inline]
    pub fn is_value_report(command: u32) -> bool {
        (PROP_VALUE_IS..=PROP_VALUE_REMOVED).contains(&command)
    }
}

/// Property keys used by the radio driver.
pub mod prop {
    pub const LAST_STATUS: u32 = 0;
    pub const PROTOCOL_VERSION: u32 = 1;
    pub const NCP_VERSION: u32 = 2;
    pub const CAPS: u32 = 5;
    pub const HWADDR: u32 = 8;

    pub const PHY_ENABLED: u32 = 0x20;
    pub const PHY_CHAN: u32 = 0x21;
    pub const PHY_CCA_THRESHOLD: u32 = 0x24;
    pub const PHY_TX_POWER: u32 = 0x25;
    pub const PHY_RSSI: u32 = 0x26;
    pub const PHY_RX_SENSITIVITY: u32 = 0x27;

    pub const MAC_SCAN_STATE: u32 = 0x30;
    pub const MAC_SCAN_MASK: u32 = 0x31;
    pub const MAC_SCAN_PERIOD: u32 = 0x32;
    pub const MAC_15_4_LADDR: u32 = 0x34;
    pub const MAC_15_4_SADDR: u32 = 0x35;
    pub const MAC_15_4_PANID: u32 = 0x36;
    pub const MAC_RAW_STREAM_ENABLED: u32 = 0x37;
    pub const MAC_PROMISCUOUS_MODE: u32 = 0x38;
    pub const MAC_ENERGY_SCAN_RESULT: u32 = 0x39;

    pub const STREAM_DEBUG: u32 = 0x70;
    pub const STREAM_RAW: u32 = 0x71;
    pub const STREAM_LOG: u32 = 0x74;

    pub const RADIO_CAPS: u32 = 0x1200 + 11;

    pub const MAC_SRC_MATCH_ENABLED: u32 = 0x1300 + 3;
    pub const MAC_SRC_MATCH_SHORT_ADDRESSES: u32 = 0x1300 + 4;
    pub const MAC_SRC_MATCH_EXTENDED_ADDRESSES: u32 = 0x1300 + 5;
}

/// Status codes carried by `LAST_STATUS`.
pub mod status {
    pub const OK: u32 = 0;
    pub const FAILURE: u32 = 1;
    pub const UNIMPLEMENTED: u32 = 2;
    pub const INVALID_ARGUMENT: u32 = 3;
    pub const INVALID_STATE: u32 = 4;
    pub const PARSE_ERROR: u32 = 9;
    pub const NOMEM: u32 = 11;
    pub const BUSY: u32 = 12;
    pub const PROP_NOT_FOUND: u32 = 13;
    pub const DROPPED: u32 = 14;
    pub const NO_ACK: u32 = 17;
    pub const CCA_FAILURE: u32 = 18;
    pub const ALREADY: u32 = 19;
    pub const ITEM_NOT_FOUND: u32 = 20;

    pub const RESET_BEGIN: u32 = 112;
    pub const RESET_POWER_ON: u32 = 112;
    pub const RESET_SOFTWARE: u32 = 114;
    pub const RESET_END: u32 = 128;

    pub const STACK_NATIVE_BEGIN: u32 = 16_384;
    pub const STACK_NATIVE_END: u32 = 81_920;

    /// Check if the status reports a co-processor reset.
    #[inline]
    pub fn is_reset(code: u32) -> bool {
        (RESET_BEGIN..RESET_END).contains(&code)
    }
}

/// Capability codes reported by `CAPS`.
pub mod caps {
    pub const MAC_RAW: u32 = 512 + 1;
    pub const OPENTHREAD_LOG_METADATA: u32 = 512 + 6;
}

/// Radio capability bits reported by `RADIO_CAPS`.
pub mod radio_caps {
    pub const ACK_TIMEOUT: u32 = 1 << 0;
    pub const ENERGY_SCAN: u32 = 1 << 1;
    pub const TRANSMIT_RETRIES: u32 = 1 << 2;
    pub const CSMA_BACKOFF: u32 = 1 << 3;

    /// Capabilities the host driver cannot work without.
    pub const REQUIRED: u32 = ACK_TIMEOUT | TRANSMIT_RETRIES | CSMA_BACKOFF;
}

/// Scan state values for `MAC_SCAN_STATE`.
pub mod scan_state {
    pub const IDLE: u8 = 0;
    pub const ENERGY: u8 = 2;
}

/// Promiscuous mode values for `MAC_PROMISCUOUS_MODE`.
pub mod promiscuous_mode {
    pub const OFF: u8 = 0;
    pub const NETWORK: u8 = 1;
    pub const FULL: u8 = 2;
}

/// Co-processor log levels used by `STREAM_LOG`.
pub mod log_level {
    pub const EMERG: u8 = 0;
    pub const ALERT: u8 = 1;
    pub const CRIT: u8 = 2;
    pub const ERR: u8 = 3;
    pub const WARN: u8 = 4;
    pub const NOTICE: u8 = 5;
    pub const INFO: u8 = 6;
    pub const DEBUG: u8 = 7;
}

/// Metadata flag: received frame was acked with frame-pending set.
pub const MD_FLAG_ACKED_FP: u16 = 0x0010;
