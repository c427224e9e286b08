//! Canonical signatures and 4-byte selectors

use alloy_primitives::keccak256;

use super::types::{Param, Selector};

/// Build the canonical signature `name(t1,t2,...)` from canonical input spellings
pub fn signature(name: &str, inputs: &[Param]) -> String {
    let types: Vec<String> = inputs.iter().map(|param| param.ty.canonical()).collect();
    format!("{}({})", name, types.join(","))
}

/// Compute the 4-byte function selector from a signature
pub fn selector_of(signature: &str) -> Selector {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}
