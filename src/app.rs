//! The three decode call patterns: manual ABI, contract address, transaction hash

use std::sync::Arc;

use futures::future::{AbortRegistration, Abortable};
use serde::Serialize;
use tracing::debug;

use crate::domain::abi::{
    decode_hex, format_args, selector_hex, AbiDecoder, DecodedArg, DecodedCall,
};
use crate::domain::contract::{
    ContractInfo, NetworkId, ProxyKind, ResolveError, Resolution, TransactionSource,
};
use crate::error::{Error, Result};
use crate::infrastructure::abi::ContractResolver;

/// What to decode and where its ABI comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeRequest {
    /// ABI supplied by the caller
    Manual { abi_json: String, calldata: String },
    /// ABI resolved from a contract address
    Contract {
        address: String,
        network: NetworkId,
        calldata: String,
    },
    /// Call data and target fetched from a transaction
    Transaction { tx_hash: String, network: NetworkId },
}

/// Contract metadata shown next to a decode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractSummary {
    pub address: String,
    pub network: NetworkId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub is_verified: bool,
    pub is_proxy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_kind: Option<ProxyKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implementation: Option<String>,
}

impl From<&ContractInfo> for ContractSummary {
    fn from(info: &ContractInfo) -> Self {
        Self {
            address: info.address.clone(),
            network: info.network,
            name: info.contract_name.clone(),
            is_verified: info.is_verified,
            is_proxy: info.is_proxy,
            proxy_kind: info.proxy_kind,
            implementation: info.implementation.clone(),
        }
    }
}

/// A decoded call, ready for display or export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeReport {
    pub function: String,
    pub signature: String,
    pub selector: String,
    pub args: Vec<DecodedArg>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract: Option<ContractSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    pub cache_used: bool,
}

impl DecodeReport {
    fn from_call(call: DecodedCall) -> Self {
        Self {
            function: call.function.name.clone(),
            signature: call.function.signature().to_string(),
            selector: selector_hex(call.selector),
            args: format_args(&call.function.inputs, &call.args),
            contract: None,
            tx_hash: None,
            cache_used: false,
        }
    }

    fn with_resolution(mut self, resolution: &Resolution) -> Self {
        self.contract = Some(ContractSummary::from(resolution.info.as_ref()));
        self.cache_used = resolution.cache_used;
        self
    }
}

/// Decode against a caller-supplied ABI. Pure: no I/O, no shared state.
pub fn decode_manual(abi_json: &str, calldata: &str) -> Result<DecodeReport> {
    let decoder = AbiDecoder::from_json(abi_json)?;
    let call = decoder.decode_hex(calldata)?;
    Ok(DecodeReport::from_call(call))
}

/// Wires the resolver and transaction source into the decode call patterns
pub struct App {
    resolver: ContractResolver,
    transactions: Option<Arc<dyn TransactionSource>>,
}

impl App {
    pub fn new(resolver: ContractResolver) -> Self {
        Self {
            resolver,
            transactions: None,
        }
    }

    pub fn with_transactions(mut self, transactions: Arc<dyn TransactionSource>) -> Self {
        self.transactions = Some(transactions);
        self
    }

    pub fn resolver(&self) -> &ContractResolver {
        &self.resolver
    }

    pub async fn decode(&self, request: DecodeRequest) -> Result<DecodeReport> {
        match request {
            DecodeRequest::Manual { abi_json, calldata } => decode_manual(&abi_json, &calldata),
            DecodeRequest::Contract {
                address,
                network,
                calldata,
            } => self.decode_contract(&address, network, &calldata).await,
            DecodeRequest::Transaction { tx_hash, network } => {
                self.decode_transaction(&tx_hash, network).await
            }
        }
    }

    /// Like [`decode`](Self::decode), abandoned when the matching handle aborts
    pub async fn decode_abortable(
        &self,
        request: DecodeRequest,
        registration: AbortRegistration,
    ) -> Result<DecodeReport> {
        Abortable::new(self.decode(request), registration)
            .await
            .map_err(|_aborted| Error::Resolve(ResolveError::Cancelled))?
    }

    /// Resolve a contract's metadata without decoding anything
    pub async fn resolve(&self, address: &str, network: NetworkId) -> Result<Resolution> {
        Ok(self.resolver.resolve(address, network).await?)
    }

    pub async fn decode_contract(
        &self,
        address: &str,
        network: NetworkId,
        calldata: &str,
    ) -> Result<DecodeReport> {
        // Bad input fails before any lookup
        let data = decode_hex(calldata)?;
        let resolution = self.resolver.resolve(address, network).await?;
        self.decode_resolved(&resolution, &data)
    }

    pub async fn decode_transaction(
        &self,
        tx_hash: &str,
        network: NetworkId,
    ) -> Result<DecodeReport> {
        let tx_hash = normalize_tx_hash(tx_hash)?;
        let transactions = self
            .transactions
            .as_ref()
            .filter(|source| source.supports(network))
            .ok_or(ResolveError::NoEndpoint { network })?;

        let tx = transactions
            .fetch_transaction(&tx_hash, network)
            .await
            .map_err(|e| ResolveError::TransportFailure(e.to_string()))?
            .ok_or_else(|| Error::TransactionNotFound {
                tx_hash: tx_hash.clone(),
            })?;

        let Some(to) = tx.to.as_deref() else {
            return Err(Error::CreationTransaction { tx_hash });
        };
        debug!(%tx_hash, to, "decoding transaction input");

        let resolution = self.resolver.resolve(to, network).await?;
        let mut report = self.decode_resolved(&resolution, &tx.input)?;
        report.tx_hash = Some(tx_hash);
        Ok(report)
    }

    fn decode_resolved(&self, resolution: &Resolution, data: &[u8]) -> Result<DecodeReport> {
        let decoder = AbiDecoder::from_json(&resolution.info.abi)?;
        let call = decoder.decode(data)?;
        Ok(DecodeReport::from_call(call).with_resolution(resolution))
    }
}

fn normalize_tx_hash(tx_hash: &str) -> Result<String> {
    let trimmed = tx_hash.trim();
    let payload = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if payload.len() != 64 || !payload.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidInput(format!(
            "'{tx_hash}' is not a 32-byte transaction hash"
        )));
    }
    Ok(format!("0x{}", payload.to_lowercase()))
}
