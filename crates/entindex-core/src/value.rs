//! Normalized decoded field values.
//!
//! Decoders emit `FieldValue` regardless of the on-chain encoding, so
//! handlers and the entity store never deal with raw ABI words.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A decoded, normalized parameter or entity field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    /// Unsigned integer that fits in u128.
    Uint(u128),
    /// Large uints (> u128) stored as decimal string.
    BigUint(String),
    /// Signed integer, stored as decimal string (covers int8..int256).
    BigInt(String),
    Bool(bool),
    Bytes(Vec<u8>),
    Str(String),
    /// EVM address — 20 bytes, hex with 0x prefix.
    Address(String),
    Null,
}

impl FieldValue {
    /// Returns `true` if this value is logically null/absent.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Returns the inner string if this is a `Str` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns the inner string if this is an `Address` value.
    pub fn as_address(&self) -> Option<&str> {
        match self {
            FieldValue::Address(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Coerce to a u128 if this is a small `Uint`.
    pub fn as_u128(&self) -> Option<u128> {
        match self {
            FieldValue::Uint(v) => Some(*v),
            _ => None,
        }
    }

    /// The decimal string form of `Uint`/`BigUint` values — the canonical
    /// representation of numeric entity ids.
    pub fn as_decimal(&self) -> Option<String> {
        match self {
            FieldValue::Uint(v) => Some(v.to_string()),
            FieldValue::BigUint(s) | FieldValue::BigInt(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Uint(v) => write!(f, "{v}"),
            FieldValue::BigUint(v) => write!(f, "{v}"),
            FieldValue::BigInt(v) => write!(f, "{v}"),
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            FieldValue::Str(s) => write!(f, "{s}"),
            FieldValue::Address(a) => write!(f, "{a}"),
            FieldValue::Null => write!(f, "null"),
        }
    }
}
