//! External collaborators: ABI source, chain reader, transaction source

use alloy_primitives::B256;
use thiserror::Error;

use super::NetworkId;

/// Failure reported by an external collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The service answered, and it has no verified source for this address
    #[error("no verified source available")]
    Unverified,
    /// The service could not be reached or answered garbage
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Proxy metadata reported by an ABI source
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProxyHint {
    /// Source-specific label, e.g. "EIP1967Proxy"
    pub label: String,
    pub implementation: Option<String>,
}

/// A contract as reported by an ABI source
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchedContract {
    pub abi: String,
    pub contract_name: Option<String>,
    pub is_verified: bool,
    /// Runtime bytecode, when the source provides it
    pub bytecode: Option<Vec<u8>>,
    pub proxy_hint: Option<ProxyHint>,
}

/// Looks up verified ABIs (Sourcify, an explorer, a local mirror, ...)
#[async_trait::async_trait]
pub trait AbiSource: Send + Sync {
    async fn fetch_verified_abi(
        &self,
        address: &str,
        network: NetworkId,
    ) -> Result<FetchedContract, SourceError>;
}

/// Reads on-chain state used for proxy detection
#[async_trait::async_trait]
pub trait ChainReader: Send + Sync {
    /// Whether this reader can reach `network` at all
    fn supports(&self, _network: NetworkId) -> bool {
        true
    }

    /// Runtime bytecode at an address (empty for EOAs)
    async fn code_at(&self, address: &str, network: NetworkId) -> Result<Vec<u8>, SourceError>;

    /// Raw 32-byte storage slot value
    async fn storage_at(
        &self,
        address: &str,
        slot: B256,
        network: NetworkId,
    ) -> Result<B256, SourceError>;
}

/// A transaction as far as decoding is concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionData {
    pub hash: String,
    pub from: Option<String>,
    /// `None` for contract creation
    pub to: Option<String>,
    pub input: Vec<u8>,
}

/// Fetches raw transactions (JSON-RPC `eth_getTransactionByHash`)
#[async_trait::async_trait]
pub trait TransactionSource: Send + Sync {
    /// Whether transactions on `network` can be fetched at all
    fn supports(&self, _network: NetworkId) -> bool {
        true
    }

    /// `Ok(None)` when the node does not know the hash
    async fn fetch_transaction(
        &self,
        tx_hash: &str,
        network: NetworkId,
    ) -> Result<Option<TransactionData>, SourceError>;
}
