//! Display formatting for decoded values.
//!
//! Formatting never fails: anything unexpected renders as a diagnostic string.

use serde::{Deserialize, Serialize};

use super::types::Param;
use super::value::DecodedValue;

/// Marker appended to strings that contained invalid UTF-8
pub const INVALID_UTF8_MARKER: &str = " [invalid utf-8]";

/// A decoded argument ready for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedArg {
    /// Position in the input list
    pub index: usize,
    /// Parameter name, or the positional index if unnamed
    pub name: String,
    /// Canonical Solidity type (e.g., "address", "uint256", "(uint256,address)")
    pub kind: String,
    /// Decoded value as a formatted string
    pub value: String,
}

/// Pair inputs with decoded values. Extra or missing values are reported inline.
pub fn format_args(inputs: &[Param], values: &[DecodedValue]) -> Vec<DecodedArg> {
    let mut out: Vec<DecodedArg> = inputs
        .iter()
        .enumerate()
        .map(|(index, param)| {
            let name = if param.name.trim().is_empty() {
                index.to_string()
            } else {
                param.name.clone()
            };
            DecodedArg {
                index,
                name,
                kind: param.ty.canonical(),
                value: values
                    .get(index)
                    .map(format_value)
                    .unwrap_or_else(|| "<missing value>".to_string()),
            }
        })
        .collect();

    for (index, value) in values.iter().enumerate().skip(inputs.len()) {
        out.push(DecodedArg {
            index,
            name: index.to_string(),
            kind: format!("<unexpected {}>", value.kind()),
            value: format_value(value),
        });
    }

    out
}

/// Format a DecodedValue for display
pub fn format_value(value: &DecodedValue) -> String {
    match value {
        DecodedValue::Address(addr) => format!("0x{}", hex::encode(addr.as_slice())),
        DecodedValue::Bool(b) => b.to_string(),
        DecodedValue::Uint(u, _) => u.to_string(),
        DecodedValue::Int(i, _) => i.to_string(),
        DecodedValue::Bytes(bytes) => format!("0x{}", hex::encode(bytes)),
        DecodedValue::Str {
            value,
            invalid_utf8,
        } => {
            if *invalid_utf8 {
                format!("{}{}", value, INVALID_UTF8_MARKER)
            } else {
                value.clone()
            }
        }
        DecodedValue::List(items) => {
            let items: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", items.join(", "))
        }
        DecodedValue::Struct(fields) => {
            let items: Vec<String> = fields.iter().map(|(_, v)| format_value(v)).collect();
            format!("({})", items.join(", "))
        }
    }
}
