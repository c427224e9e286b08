//! Proxy pattern detection
//!
//! | Pattern | Detection |
//! |---------|-----------|
//! | EIP-1167 minimal proxy | 45-byte runtime bytecode with an embedded address |
//! | Source metadata | proxy label reported by the ABI source |
//! | EIP-1967 transparent / UUPS | implementation slot, admin slot decides the kind |
//! | EIP-1822 UUPS | `PROXIABLE` slot |
//! | EIP-1967 beacon | beacon slot (not followed) |
//! | ABI shape | upgrade/admin functions, implementation unknown |
//!
//! Checks run in that order and the first match wins.

use alloy_primitives::{b256, B256};
use std::sync::Arc;
use tracing::debug;

use crate::domain::abi::AbiDefinition;
use crate::domain::contract::{
    normalize_address, ChainReader, FetchedContract, NetworkId, ProxyKind, SourceError,
};

/// `keccak256("eip1967.proxy.implementation") - 1`
pub const EIP1967_IMPL_SLOT: B256 =
    b256!("360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc");

/// `keccak256("eip1967.proxy.admin") - 1`
pub const EIP1967_ADMIN_SLOT: B256 =
    b256!("b53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103");

/// `keccak256("eip1967.proxy.beacon") - 1`
pub const EIP1967_BEACON_SLOT: B256 =
    b256!("a3f0ad74e5423aebfd80d3ef4346578335a9a72aeaee59ff6cb3582b35133d50");

/// `keccak256("PROXIABLE")`
pub const EIP1822_PROXIABLE_SLOT: B256 =
    b256!("c5f16f0fcc639fa48a6947836d9850f504798523bf8c9a3a87d5876cf622bcf7");

/// EIP-1167 runtime code before the embedded address
pub const EIP1167_PREFIX: &[u8] = &[0x36, 0x3d, 0x3d, 0x37, 0x3d, 0x3d, 0x3d, 0x36, 0x3d, 0x73];

/// EIP-1167 runtime code after the embedded address
pub const EIP1167_SUFFIX: &[u8] = &[
    0x5a, 0xf4, 0x3d, 0x82, 0x80, 0x3e, 0x90, 0x3d, 0x91, 0x60, 0x2b, 0x57, 0xfd, 0x5b, 0xf3,
];

const EIP1167_LEN: usize = 45;

/// What the detector found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyDetection {
    pub kind: ProxyKind,
    /// Lowercase `0x` implementation address, when determinable
    pub implementation: Option<String>,
}

impl ProxyDetection {
    fn new(kind: ProxyKind, implementation: Option<String>) -> Self {
        Self {
            kind,
            implementation,
        }
    }
}

/// Extract the implementation from EIP-1167 runtime bytecode
pub fn detect_minimal_proxy(bytecode: &[u8]) -> Option<String> {
    if bytecode.len() != EIP1167_LEN
        || &bytecode[..10] != EIP1167_PREFIX
        || &bytecode[30..] != EIP1167_SUFFIX
    {
        return None;
    }
    Some(format!("0x{}", hex::encode(&bytecode[10..30])))
}

/// Read an address out of a storage word. Zero, or a word with non-zero upper
/// bytes, is not an address.
pub fn slot_to_address(value: B256) -> Option<String> {
    let bytes = value.as_slice();
    if bytes[..12].iter().any(|b| *b != 0) || bytes[12..].iter().all(|b| *b == 0) {
        return None;
    }
    Some(format!("0x{}", hex::encode(&bytes[12..])))
}

/// Map an ABI-source proxy label onto a proxy kind
pub fn kind_from_label(label: &str) -> ProxyKind {
    let lower = label.to_ascii_lowercase();
    if lower.contains("1167") || lower.contains("minimal") || lower.contains("clone") {
        ProxyKind::Minimal
    } else if lower.contains("uups") || lower.contains("1822") {
        ProxyKind::Uups
    } else if lower.contains("1967") || lower.contains("transparent") {
        ProxyKind::Transparent
    } else {
        ProxyKind::Unknown
    }
}

/// Classify from the ABI alone. Only says "this is a proxy"; it never yields an
/// implementation address.
pub fn detect_from_abi(abi: &AbiDefinition) -> Option<ProxyKind> {
    let upgradeable = abi.has_function("upgradeTo") || abi.has_function("upgradeToAndCall");
    let administered = abi.has_function("admin") || abi.has_function("changeAdmin");

    if upgradeable && administered {
        Some(ProxyKind::Transparent)
    } else if upgradeable || abi.has_function("proxiableUUID") {
        Some(ProxyKind::Uups)
    } else if abi.has_function("implementation") {
        Some(ProxyKind::Unknown)
    } else {
        None
    }
}

/// Runs the detection heuristics, reading chain state when a reader is present
#[derive(Clone, Default)]
pub struct ProxyDetector {
    chain: Option<Arc<dyn ChainReader>>,
}

impl ProxyDetector {
    pub fn new(chain: Option<Arc<dyn ChainReader>>) -> Self {
        Self { chain }
    }

    /// The chain reader, if it can reach `network`
    fn chain_for(&self, network: NetworkId) -> Option<&Arc<dyn ChainReader>> {
        self.chain.as_ref().filter(|chain| chain.supports(network))
    }

    /// Classify a contract the ABI source knows about
    pub async fn detect(
        &self,
        address: &str,
        network: NetworkId,
        fetched: &FetchedContract,
        abi: &AbiDefinition,
    ) -> Result<Option<ProxyDetection>, SourceError> {
        let bytecode = match (&fetched.bytecode, self.chain_for(network)) {
            (Some(code), _) => Some(code.clone()),
            (None, Some(chain)) => Some(chain.code_at(address, network).await?),
            (None, None) => None,
        };
        if let Some(implementation) = bytecode.as_deref().and_then(detect_minimal_proxy) {
            debug!(address, %implementation, "EIP-1167 bytecode");
            return Ok(Some(ProxyDetection::new(
                ProxyKind::Minimal,
                Some(implementation),
            )));
        }

        if let Some(hint) = &fetched.proxy_hint {
            debug!(address, label = %hint.label, "proxy reported by source");
            return Ok(Some(ProxyDetection::new(
                kind_from_label(&hint.label),
                hint.implementation.as_deref().and_then(normalize_address),
            )));
        }

        if let Some(found) = self.detect_from_storage(address, network).await? {
            return Ok(Some(found));
        }

        Ok(detect_from_abi(abi).map(|kind| ProxyDetection::new(kind, None)))
    }

    /// Classify a contract from its runtime code alone (no verified source)
    pub async fn detect_unverified(
        &self,
        address: &str,
        network: NetworkId,
    ) -> Result<Option<ProxyDetection>, SourceError> {
        let Some(chain) = self.chain_for(network) else {
            return Ok(None);
        };
        let code = chain.code_at(address, network).await?;
        if let Some(implementation) = detect_minimal_proxy(&code) {
            return Ok(Some(ProxyDetection::new(
                ProxyKind::Minimal,
                Some(implementation),
            )));
        }
        if code.is_empty() {
            return Ok(None);
        }
        self.detect_from_storage(address, network).await
    }

    /// Check the EIP-1967 and EIP-1822 storage slots
    pub async fn detect_from_storage(
        &self,
        address: &str,
        network: NetworkId,
    ) -> Result<Option<ProxyDetection>, SourceError> {
        let Some(chain) = self.chain_for(network) else {
            return Ok(None);
        };

        let read = |slot: B256| chain.storage_at(address, slot, network);

        if let Some(implementation) = slot_to_address(read(EIP1967_IMPL_SLOT).await?) {
            let kind = if slot_to_address(read(EIP1967_ADMIN_SLOT).await?).is_some() {
                ProxyKind::Transparent
            } else {
                ProxyKind::Uups
            };
            debug!(address, %implementation, %kind, "EIP-1967 implementation slot");
            return Ok(Some(ProxyDetection::new(kind, Some(implementation))));
        }

        if let Some(implementation) = slot_to_address(read(EIP1822_PROXIABLE_SLOT).await?) {
            debug!(address, %implementation, "EIP-1822 proxiable slot");
            return Ok(Some(ProxyDetection::new(
                ProxyKind::Uups,
                Some(implementation),
            )));
        }

        if let Some(beacon) = slot_to_address(read(EIP1967_BEACON_SLOT).await?) {
            debug!(address, %beacon, "EIP-1967 beacon slot");
            return Ok(Some(ProxyDetection::new(ProxyKind::Unknown, None)));
        }

        Ok(None)
    }
}
