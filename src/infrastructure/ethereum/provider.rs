//! JSON-RPC access via Alloy HTTP providers
//!
//! Uses raw JSON requests for transaction fetching to support all EVM chains
//! including L2s like Optimism/Base that have non-standard transaction types.

use std::collections::HashMap;

use alloy::network::Ethereum;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{
    fillers::{BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller},
    Identity, Provider, ProviderBuilder, RootProvider,
};
use anyhow::{Context, Result};
use tracing::debug;

use crate::domain::contract::{
    ChainReader, NetworkId, SourceError, TransactionData, TransactionSource,
};

type HttpFillProvider = FillProvider<
    JoinFill<
        Identity,
        JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
    >,
    RootProvider,
    Ethereum,
>;

/// HTTP JSON-RPC client with one endpoint per chain
#[derive(Default)]
pub struct RpcClient {
    endpoints: HashMap<NetworkId, HttpFillProvider>,
}

impl RpcClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the endpoint for a chain
    pub fn add_endpoint(&mut self, network: NetworkId, url: &str) -> Result<()> {
        let rpc_url = url
            .parse()
            .with_context(|| format!("Invalid HTTP URL '{url}'"))?;
        let provider = ProviderBuilder::new().connect_http(rpc_url);
        self.endpoints.insert(network, provider);
        Ok(())
    }

    pub fn has_endpoint(&self, network: NetworkId) -> bool {
        self.endpoints.contains_key(&network)
    }

    fn provider(&self, network: NetworkId) -> Result<&HttpFillProvider, SourceError> {
        self.endpoints
            .get(&network)
            .ok_or_else(|| SourceError::Transport(format!("no RPC endpoint for chain {network}")))
    }
}

fn transport(e: impl std::fmt::Display) -> SourceError {
    SourceError::Transport(e.to_string())
}

fn parse_address(address: &str) -> Result<Address, SourceError> {
    address
        .parse()
        .map_err(|e| SourceError::Transport(format!("invalid address '{address}': {e}")))
}

#[async_trait::async_trait]
impl TransactionSource for RpcClient {
    fn supports(&self, network: NetworkId) -> bool {
        self.has_endpoint(network)
    }

    async fn fetch_transaction(
        &self,
        tx_hash: &str,
        network: NetworkId,
    ) -> Result<Option<TransactionData>, SourceError> {
        let provider = self.provider(network)?;
        debug!(network, tx_hash, "eth_getTransactionByHash");

        let json: serde_json::Value = provider
            .raw_request("eth_getTransactionByHash".into(), (tx_hash,))
            .await
            .map_err(transport)?;

        if json.is_null() {
            return Ok(None);
        }
        parse_raw_transaction(&json)
            .map(Some)
            .ok_or_else(|| transport("malformed transaction object"))
    }
}

#[async_trait::async_trait]
impl ChainReader for RpcClient {
    fn supports(&self, network: NetworkId) -> bool {
        self.has_endpoint(network)
    }

    async fn code_at(&self, address: &str, network: NetworkId) -> Result<Vec<u8>, SourceError> {
        let provider = self.provider(network)?;
        let code = provider
            .get_code_at(parse_address(address)?)
            .await
            .map_err(transport)?;
        Ok(code.to_vec())
    }

    async fn storage_at(
        &self,
        address: &str,
        slot: B256,
        network: NetworkId,
    ) -> Result<B256, SourceError> {
        let provider = self.provider(network)?;
        let value = provider
            .get_storage_at(parse_address(address)?, U256::from_be_bytes(slot.0))
            .await
            .map_err(transport)?;
        Ok(B256::from(value))
    }
}

/// Parse a transaction object. `to` is null for contract creation.
fn parse_raw_transaction(json: &serde_json::Value) -> Option<TransactionData> {
    let hash = json.get("hash")?.as_str()?.to_string();
    let from = json
        .get("from")
        .and_then(|v| v.as_str())
        .map(|s| s.to_lowercase());
    let to = json
        .get("to")
        .and_then(|v| v.as_str())
        .map(|s| s.to_lowercase());

    // Some nodes still send the legacy "data" field
    let input_str = json
        .get("input")
        .or_else(|| json.get("data"))
        .and_then(|v| v.as_str())
        .unwrap_or("0x");
    let input = hex::decode(input_str.strip_prefix("0x").unwrap_or(input_str)).ok()?;

    Some(TransactionData {
        hash,
        from,
        to,
        input,
    })
}
