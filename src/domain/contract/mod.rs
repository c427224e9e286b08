//! Contract metadata models and the collaborator contracts the resolver needs

mod error;
mod source;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use error::ResolveError;
pub use source::{
    AbiSource, ChainReader, FetchedContract, ProxyHint, SourceError, TransactionData,
    TransactionSource,
};

/// EVM chain id
pub type NetworkId = u64;

/// Detected proxy pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    /// EIP-1167 minimal proxy (clone)
    Minimal,
    /// Transparent upgradeable proxy (EIP-1967 slots with an admin)
    Transparent,
    /// EIP-1822 / UUPS proxy
    Uups,
    /// Looks like a proxy, pattern not recognized
    Unknown,
}

impl ProxyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyKind::Minimal => "minimal",
            ProxyKind::Transparent => "transparent",
            ProxyKind::Uups => "uups",
            ProxyKind::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "minimal" => Some(ProxyKind::Minimal),
            "transparent" => Some(ProxyKind::Transparent),
            "uups" => Some(ProxyKind::Uups),
            "unknown" => Some(ProxyKind::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved contract metadata. Never mutated once built; a refresh replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInfo {
    /// Lowercase `0x` address that was asked for (the proxy, when proxied)
    pub address: String,
    pub network: NetworkId,
    /// Effective ABI JSON (the implementation's ABI for a followed proxy)
    pub abi: String,
    pub contract_name: Option<String>,
    pub is_verified: bool,
    pub is_proxy: bool,
    pub proxy_kind: Option<ProxyKind>,
    /// Set only for proxies whose implementation could be determined
    pub implementation: Option<String>,
}

/// Outcome of a resolution
#[derive(Debug, Clone)]
pub struct Resolution {
    pub info: Arc<ContractInfo>,
    /// Served from the cache without an external fetch
    pub cache_used: bool,
}

/// Normalize an address to lowercase `0x` + 40 hex characters
pub fn normalize_address(address: &str) -> Option<String> {
    let trimmed = address.trim();
    let payload = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if payload.len() != 40 || !payload.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{}", payload.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_address() {
        assert_eq!(
            normalize_address("0x742d35Cc6634C0532925a3b8D91B94E8a72c3B31").as_deref(),
            Some("0x742d35cc6634c0532925a3b8d91b94e8a72c3b31")
        );
        assert_eq!(
            normalize_address("742D35CC6634C0532925A3B8D91B94E8A72C3B31").as_deref(),
            Some("0x742d35cc6634c0532925a3b8d91b94e8a72c3b31")
        );
        assert!(normalize_address("0x1234").is_none());
        assert!(normalize_address("0xzz2d35cc6634c0532925a3b8d91b94e8a72c3b31").is_none());
    }

    #[test]
    fn test_proxy_kind_round_trip() {
        for kind in [
            ProxyKind::Minimal,
            ProxyKind::Transparent,
            ProxyKind::Uups,
            ProxyKind::Unknown,
        ] {
            assert_eq!(ProxyKind::parse(kind.as_str()), Some(kind));
        }
    }
}
