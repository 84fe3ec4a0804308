//! Tagged property values.
//!
//! A property payload is a sequence of [`Value`]s. Decoding is driven by a
//! matching sequence of [`Kind`]s.
//!
//! Framing rule: `Data` carries a u16 length prefix unless it is the last
//! item of its enclosing sequence, in which case it extends to the end.
//! `DataWlen` and `Struct` are always prefixed.
//!
//! # Example
//!
//! ```
//! use ncp_spinel::codec::{decode_values, encode_values, Kind, Value};
//!
//! let payload = encode_values(&[Value::U8(11), Value::Data(vec![1, 2].into())]).unwrap();
//! assert_eq!(&payload[..], &[11, 1, 2]);
//!
//! let values = decode_values(&payload, &[Kind::U8, Kind::Data]).unwrap();
//! assert_eq!(values[0], Value::U8(11));
//! ```

use bytes::Bytes;

use super::{SpinelDecoder, SpinelEncoder};
use crate::error::{Result, SpinelError};

/// One typed element of a property payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    UintPacked(u32),
    Eui64([u8; 8]),
    Utf8(String),
    Data(Bytes),
    DataWlen(Bytes),
    Struct(Vec<Value>),
}

/// Shape of one payload element, used to decode a [`Value`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    Bool,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    UintPacked,
    Eui64,
    Utf8,
    Data,
    DataWlen,
    Struct(Vec<Kind>),
}

impl Value {
    /// Kind describing this value.
    pub fn kind(&self) -> Kind {
        match self {
            Value::Bool(_) => Kind::Bool,
            Value::U8(_) => Kind::U8,
            Value::I8(_) => Kind::I8,
            Value::U16(_) => Kind::U16,
            Value::I16(_) => Kind::I16,
            Value::U32(_) => Kind::U32,
            Value::I32(_) => Kind::I32,
            Value::U64(_) => Kind::U64,
            Value::UintPacked(_) => Kind::UintPacked,
            Value::Eui64(_) => Kind::Eui64,
            Value::Utf8(_) => Kind::Utf8,
            Value::Data(_) => Kind::Data,
            Value::DataWlen(_) => Kind::DataWlen,
            Value::Struct(items) => Kind::Struct(items.iter().map(Value::kind).collect()),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Any unsigned integer variant widened to u64.
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::U8(v) => Some(*v as u64),
            Value::U16(v) => Some(*v as u64),
            Value::U32(v) | Value::UintPacked(v) => Some(*v as u64),
            Value::U64(v) => Some(*v),
            _ => None,
        }
    }

    /// Any signed integer variant widened to i64.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::I8(v) => Some(*v as i64),
            Value::I16(v) => Some(*v as i64),
            Value::I32(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Data(v) | Value::DataWlen(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Utf8(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_eui64(&self) -> Option<&[u8; 8]> {
        match self {
            Value::Eui64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&[Value]> {
        match self {
            Value::Struct(items) => Some(items),
            _ => None,
        }
    }
}

/// Encode a value sequence into a property payload.
pub fn encode_values(values: &[Value]) -> Result<Bytes> {
    let mut encoder = SpinelEncoder::new();
    encode_into(&mut encoder, values)?;
    Ok(encoder.finish())
}

/// Encode a value sequence into an existing encoder.
pub fn encode_into(encoder: &mut SpinelEncoder, values: &[Value]) -> Result<()> {
    let count = values.len();
    for (i, value) in values.iter().enumerate() {
        encode_one(encoder, value, i + 1 == count)?;
    }
    Ok(())
}

fn encode_one(encoder: &mut SpinelEncoder, value: &Value, last: bool) -> Result<()> {
    match value {
        Value::Bool(v) => encoder.write_bool(*v),
        Value::U8(v) => encoder.write_u8(*v),
        Value::I8(v) => encoder.write_i8(*v),
        Value::U16(v) => encoder.write_u16(*v),
        Value::I16(v) => encoder.write_i16(*v),
        Value::U32(v) => encoder.write_u32(*v),
        Value::I32(v) => encoder.write_i32(*v),
        Value::U64(v) => encoder.write_u64(*v),
        Value::UintPacked(v) => encoder.write_uint_packed(*v)?,
        Value::Eui64(v) => encoder.write_eui64(v),
        Value::Utf8(v) => encoder.write_utf8(v)?,
        Value::Data(v) if last => encoder.write_data(v),
        Value::Data(v) | Value::DataWlen(v) => encoder.write_data_wlen(v)?,
        Value::Struct(items) => {
            encoder.open_struct();
            encode_into(encoder, items)?;
            encoder.close_struct()?;
        }
    }
    Ok(())
}

/// Decode a property payload according to `kinds`.
///
/// Bytes left over after the last kind are ignored.
pub fn decode_values(payload: &[u8], kinds: &[Kind]) -> Result<Vec<Value>> {
    let mut decoder = SpinelDecoder::new(payload);
    decode_from(&mut decoder, kinds)
}

/// Decode values from an existing decoder.
pub fn decode_from(decoder: &mut SpinelDecoder<'_>, kinds: &[Kind]) -> Result<Vec<Value>> {
    let count = kinds.len();
    kinds
        .iter()
        .enumerate()
        .map(|(i, kind)| decode_one(decoder, kind, i + 1 == count))
        .collect()
}

fn decode_one(decoder: &mut SpinelDecoder<'_>, kind: &Kind, last: bool) -> Result<Value> {
    let value = match kind {
        Kind::Bool => Value::Bool(decoder.read_bool()?),
        Kind::U8 => Value::U8(decoder.read_u8()?),
        Kind::I8 => Value::I8(decoder.read_i8()?),
        Kind::U16 => Value::U16(decoder.read_u16()?),
        Kind::I16 => Value::I16(decoder.read_i16()?),
        Kind::U32 => Value::U32(decoder.read_u32()?),
        Kind::I32 => Value::I32(decoder.read_i32()?),
        Kind::U64 => Value::U64(decoder.read_u64()?),
        Kind::UintPacked => Value::UintPacked(decoder.read_uint_packed()?),
        Kind::Eui64 => Value::Eui64(decoder.read_eui64()?),
        Kind::Utf8 => Value::Utf8(decoder.read_utf8()?.to_owned()),
        Kind::Data if last => Value::Data(Bytes::copy_from_slice(decoder.read_data())),
        Kind::Data => Value::Data(Bytes::copy_from_slice(decoder.read_data_wlen()?)),
        Kind::DataWlen => Value::DataWlen(Bytes::copy_from_slice(decoder.read_data_wlen()?)),
        Kind::Struct(inner) => {
            let mut body = decoder.read_struct()?;
            Value::Struct(decode_from(&mut body, inner)?)
        }
    };
    Ok(value)
}

/// Decode exactly one value of `kind`, the common case for scalar properties.
pub fn decode_single(payload: &[u8], kind: Kind) -> Result<Value> {
    decode_values(payload, std::slice::from_ref(&kind))?
        .pop()
        .ok_or_else(|| SpinelError::parse("Empty value list"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_data_has_no_prefix() {
        let payload = encode_values(&[Value::Data(Bytes::from_static(b"abc"))]).unwrap();
        assert_eq!(&payload[..], b"abc");
    }

    #[test]
    fn test_inner_data_is_prefixed() {
        let payload = encode_values(&[
            Value::Data(Bytes::from_static(b"ab")),
            Value::U8(7),
        ])
        .unwrap();
        assert_eq!(&payload[..], &[0x02, 0x00, b'a', b'b', 0x07]);

        let values = decode_values(&payload, &[Kind::Data, Kind::U8]).unwrap();
        assert_eq!(values[0].as_bytes().unwrap(), &Bytes::from_static(b"ab"));
        assert_eq!(values[1], Value::U8(7));
    }

    #[test]
    fn test_struct_always_prefixed() {
        let values = vec![
            Value::Struct(vec![Value::U8(11), Value::U8(200)]),
            Value::Struct(vec![Value::I32(0)]),
        ];
        let payload = encode_values(&values).unwrap();

        assert_eq!(
            &payload[..],
            &[0x02, 0x00, 11, 200, 0x04, 0x00, 0, 0, 0, 0]
        );

        let kinds: Vec<Kind> = values.iter().map(Value::kind).collect();
        assert_eq!(decode_values(&payload, &kinds).unwrap(), values);
    }

    #[test]
    fn test_data_wlen_always_prefixed() {
        let payload = encode_values(&[Value::DataWlen(Bytes::from_static(b"z"))]).unwrap();
        assert_eq!(&payload[..], &[0x01, 0x00, b'z']);
    }

    #[test]
    fn test_decode_single_scalar() {
        let value = decode_single(&[0xB5], Kind::I8).unwrap();
        assert_eq!(value.as_int(), Some(-75));
    }

    #[test]
    fn test_decode_truncated_payload() {
        let result = decode_values(&[0x01], &[Kind::U8, Kind::U16]);
        assert!(matches!(result, Err(SpinelError::Parse(_))));
    }

    #[test]
    fn test_mixed_sequence() {
        let values = vec![
            Value::UintPacked(4),
            Value::UintPacked(3),
            Value::Utf8("OPENTHREAD".into()),
            Value::Eui64([1, 2, 3, 4, 5, 6, 7, 8]),
            Value::Bool(true),
        ];
        let payload = encode_values(&values).unwrap();
        let kinds: Vec<Kind> = values.iter().map(Value::kind).collect();
        assert_eq!(decode_values(&payload, &kinds).unwrap(), values);
    }
}
