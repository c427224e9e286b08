//! Errors raised while parsing ABIs and decoding call data

use thiserror::Error;

/// Parse and decode failures. Each variant carries enough context (type string,
/// byte offset) to render a precise message; nothing is recovered silently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("malformed ABI JSON: {reason}")]
    MalformedAbiJson { reason: String },

    #[error("unsupported type '{ty}': {reason}")]
    UnsupportedType { ty: String, reason: String },

    #[error("selector {selector} is shared by {}", signatures.join(", "))]
    SelectorCollision {
        selector: String,
        signatures: Vec<String>,
    },

    #[error("no function in the ABI matches selector {selector}")]
    UnknownSelector { selector: String },

    #[error("truncated payload decoding {ty} at offset {offset}: need {needed} bytes, {available} available")]
    TruncatedPayload {
        ty: String,
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("invalid hex input: {reason}")]
    InvalidHexInput { reason: String },

    #[error("value at offset {offset} does not fit {ty}")]
    ValueOutOfRange { ty: String, offset: usize },

    #[error("offset or length word for {ty} at offset {offset} points outside the payload")]
    InvalidOffset { ty: String, offset: usize },

    #[error("decoding {ty} at offset {offset} expands far beyond the payload size")]
    ExcessiveExpansion { ty: String, offset: usize },

    #[error("argument mismatch: {reason}")]
    ArgumentMismatch { reason: String },
}

impl AbiError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        AbiError::MalformedAbiJson {
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(ty: impl Into<String>, reason: impl Into<String>) -> Self {
        AbiError::UnsupportedType {
            ty: ty.into(),
            reason: reason.into(),
        }
    }
}

/// Parse a `0x`-prefixed (or bare) hex string into bytes
pub fn decode_hex(input: &str) -> Result<Vec<u8>, AbiError> {
    let trimmed = input.trim();
    let payload = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if payload.len() % 2 != 0 {
        return Err(AbiError::InvalidHexInput {
            reason: format!("odd number of hex digits ({})", payload.len()),
        });
    }
    hex::decode(payload).map_err(|err| AbiError::InvalidHexInput {
        reason: err.to_string(),
    })
}
