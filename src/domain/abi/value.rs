//! Decoded value tree, mirroring `TypeDescriptor`

use alloy_primitives::{Address, I256, U256};

/// A decoded ABI value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedValue {
    Address(Address),
    Bool(bool),
    /// Unsigned integer with its declared bit width
    Uint(U256, u16),
    /// Signed integer with its declared bit width
    Int(I256, u16),
    /// Fixed (`bytesN`) or dynamic (`bytes`) byte sequence
    Bytes(Vec<u8>),
    /// String decoded lossily; `invalid_utf8` is set when replacement happened
    Str { value: String, invalid_utf8: bool },
    List(Vec<DecodedValue>),
    Struct(Vec<(String, DecodedValue)>),
}

impl DecodedValue {
    pub fn string(value: impl Into<String>) -> Self {
        DecodedValue::Str {
            value: value.into(),
            invalid_utf8: false,
        }
    }

    /// Decode raw bytes as UTF-8, flagging rather than hiding invalid sequences
    pub fn from_utf8_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(s) => DecodedValue::string(s),
            Err(_) => DecodedValue::Str {
                value: String::from_utf8_lossy(bytes).into_owned(),
                invalid_utf8: true,
            },
        }
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            DecodedValue::Address(addr) => Some(*addr),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<U256> {
        match self {
            DecodedValue::Uint(value, _) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            DecodedValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[DecodedValue]> {
        match self {
            DecodedValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DecodedValue::Str { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Short tag for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            DecodedValue::Address(_) => "address",
            DecodedValue::Bool(_) => "bool",
            DecodedValue::Uint(..) => "uint",
            DecodedValue::Int(..) => "int",
            DecodedValue::Bytes(_) => "bytes",
            DecodedValue::Str { .. } => "string",
            DecodedValue::List(_) => "list",
            DecodedValue::Struct(_) => "struct",
        }
    }
}
