//! VAP body codec
//!
//! Bodies are MessagePack. Two shapes are in use for structured data:
//! maps keyed by field name and positional tuples in field order. Encoding
//! picks one explicitly; decoding accepts either for struct-shaped types.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{Error, Result, Value};

/// Shape used to encode structs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Structs as maps with string keys
    #[default]
    Named,
    /// Structs as arrays in field order
    Positional,
}

/// Encode a value with the given struct shape
pub fn encode<T: Serialize + ?Sized>(value: &T, encoding: Encoding) -> Result<Bytes> {
    let buf = match encoding {
        Encoding::Named => rmp_serde::to_vec_named(value)?,
        Encoding::Positional => rmp_serde::to_vec(value)?,
    };
    Ok(Bytes::from(buf))
}

/// Decode a value from a MessagePack body
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    if bytes.is_empty() {
        return Err(Error::BufferTooSmall { needed: 1, have: 0 });
    }
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Read one element of a tuple-encoded body without decoding the rest
/// into a concrete type
pub fn tuple_element(bytes: &[u8], index: usize) -> Result<Value> {
    let elements: Vec<Value> = decode(bytes)?;
    let len = elements.len();
    elements.into_iter().nth(index).ok_or_else(|| {
        Error::DecodeError(format!("tuple has {} elements, wanted index {}", len, index))
    })
}
