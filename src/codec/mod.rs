//! Codec module - Spinel datatype serialization.
//!
//! - [`SpinelEncoder`] / [`SpinelDecoder`] - primitive datatypes (packed uint,
//!   little-endian integers, EUI-64, UTF-8, length-prefixed data and structs)
//! - [`Value`] / [`Kind`] - tagged payload elements replacing pack format strings
//!
//! # Example
//!
//! ```
//! use ncp_spinel::codec::{SpinelDecoder, SpinelEncoder};
//!
//! let mut encoder = SpinelEncoder::new();
//! encoder.write_u8(11);
//! encoder.write_utf8("OPENTHREAD").unwrap();
//! let bytes = encoder.finish();
//!
//! let mut decoder = SpinelDecoder::new(&bytes);
//! assert_eq!(decoder.read_u8().unwrap(), 11);
//! assert_eq!(decoder.read_utf8().unwrap(), "OPENTHREAD");
//! ```

mod decoder;
mod encoder;
mod value;

pub use decoder::SpinelDecoder;
pub use encoder::SpinelEncoder;
pub use value::{decode_from, decode_single, decode_values, encode_into, encode_values, Kind, Value};
