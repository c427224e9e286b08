//! Verified ABI lookup via the Sourcify v2 API

use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::domain::contract::{AbiSource, FetchedContract, NetworkId, ProxyHint, SourceError};

pub const DEFAULT_SOURCIFY_URL: &str = "https://sourcify.dev/server";

const FIELDS: &str = "abi,compilation.name,runtimeBytecode.onchainBytecode,proxyResolution";

/// Sourcify API response structures
#[derive(Debug, Deserialize)]
struct SourcifyContract {
    #[serde(rename = "match", default)]
    match_kind: Option<String>,
    #[serde(default)]
    abi: Option<serde_json::Value>,
    #[serde(default)]
    compilation: Option<SourcifyCompilation>,
    #[serde(rename = "runtimeBytecode", default)]
    runtime_bytecode: Option<SourcifyBytecode>,
    #[serde(rename = "proxyResolution", default)]
    proxy_resolution: Option<SourcifyProxyResolution>,
}

#[derive(Debug, Deserialize)]
struct SourcifyCompilation {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SourcifyBytecode {
    #[serde(rename = "onchainBytecode", default)]
    onchain_bytecode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SourcifyProxyResolution {
    #[serde(rename = "isProxy", default)]
    is_proxy: bool,
    #[serde(rename = "proxyType", default)]
    proxy_type: Option<String>,
    #[serde(default)]
    implementations: Vec<SourcifyImplementation>,
}

#[derive(Debug, Deserialize)]
struct SourcifyImplementation {
    address: String,
}

/// HTTP client for a Sourcify server
#[derive(Debug, Clone)]
pub struct SourcifyClient {
    http: reqwest::Client,
    base_url: String,
}

impl SourcifyClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("abilens/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn contract_url(&self, network: NetworkId, address: &str) -> String {
        format!(
            "{}/v2/contract/{}/{}?fields={}",
            self.base_url,
            network,
            address.to_lowercase(),
            FIELDS
        )
    }
}

#[async_trait::async_trait]
impl AbiSource for SourcifyClient {
    async fn fetch_verified_abi(
        &self,
        address: &str,
        network: NetworkId,
    ) -> Result<FetchedContract, SourceError> {
        let url = self.contract_url(network, address);
        debug!(%url, "querying Sourcify");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::Transport(format!("Sourcify request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::Unverified);
        }
        if !status.is_success() {
            return Err(SourceError::Transport(format!(
                "Sourcify returned status {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Transport(format!("failed to read Sourcify response: {e}")))?;
        parse_contract(&body)
    }
}

/// Turn a Sourcify v2 contract response into a fetched contract
fn parse_contract(body: &str) -> Result<FetchedContract, SourceError> {
    let data: SourcifyContract = serde_json::from_str(body)
        .map_err(|e| SourceError::Transport(format!("failed to parse Sourcify response: {e}")))?;

    if data.match_kind.is_none() {
        return Err(SourceError::Unverified);
    }
    let abi = match data.abi {
        Some(abi @ serde_json::Value::Array(_)) => abi.to_string(),
        _ => return Err(SourceError::Unverified),
    };

    let bytecode = data
        .runtime_bytecode
        .and_then(|code| code.onchain_bytecode)
        .and_then(|code| hex::decode(code.trim_start_matches("0x")).ok());

    let proxy_hint = data
        .proxy_resolution
        .filter(|resolution| resolution.is_proxy)
        .map(|resolution| ProxyHint {
            label: resolution.proxy_type.unwrap_or_default(),
            implementation: resolution
                .implementations
                .into_iter()
                .next()
                .map(|implementation| implementation.address),
        });

    Ok(FetchedContract {
        abi,
        contract_name: data.compilation.and_then(|compilation| compilation.name),
        is_verified: true,
        bytecode,
        proxy_hint,
    })
}
