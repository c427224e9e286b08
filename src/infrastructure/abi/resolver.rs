//! Contract resolution: cache, ABI source, proxy detection

use futures::future::{AbortRegistration, Abortable, BoxFuture, FutureExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::proxy::{detect_from_abi, ProxyDetection, ProxyDetector};
use crate::domain::abi::AbiParser;
use crate::domain::contract::{
    normalize_address, AbiSource, ChainReader, ContractInfo, FetchedContract, NetworkId,
    ResolveError, Resolution, SourceError,
};
use crate::store::AbiCache;

/// How many proxy hops are followed by default
pub const DEFAULT_MAX_PROXY_DEPTH: usize = 3;

/// Resolves contract metadata with caching and proxy following.
///
/// Everything a resolution learns is staged and written to the cache in one
/// step after the last await, so an abandoned or failed resolution leaves the
/// cache untouched.
pub struct ContractResolver {
    source: Arc<dyn AbiSource>,
    detector: ProxyDetector,
    cache: Arc<AbiCache>,
    max_proxy_depth: usize,
}

impl ContractResolver {
    pub fn new(source: Arc<dyn AbiSource>, cache: Arc<AbiCache>) -> Self {
        Self {
            source,
            detector: ProxyDetector::default(),
            cache,
            max_proxy_depth: DEFAULT_MAX_PROXY_DEPTH,
        }
    }

    /// Read storage slots and runtime code for proxy detection
    pub fn with_chain_reader(mut self, chain: Arc<dyn ChainReader>) -> Self {
        self.detector = ProxyDetector::new(Some(chain));
        self
    }

    pub fn with_max_proxy_depth(mut self, depth: usize) -> Self {
        self.max_proxy_depth = depth;
        self
    }

    pub fn cache(&self) -> &Arc<AbiCache> {
        &self.cache
    }

    /// Resolve a contract, serving live cache entries without any fetch
    pub async fn resolve(
        &self,
        address: &str,
        network: NetworkId,
    ) -> Result<Resolution, ResolveError> {
        let address = normalize_address(address)
            .ok_or_else(|| ResolveError::InvalidAddress(address.to_string()))?;

        if let Some(info) = self.cache.get(network, &address) {
            debug!(network, %address, "resolved from cache");
            return Ok(Resolution {
                info,
                cache_used: true,
            });
        }

        let mut staged = Vec::new();
        let info = self
            .resolve_uncached(address, network, 0, &mut staged)
            .await?;

        // No await past this point: the writes below land together or not at all
        if !staged.is_empty() {
            self.cache.put_all(staged);
        }
        let info = self.cache.put(info);

        info!(
            network,
            address = %info.address,
            name = info.contract_name.as_deref().unwrap_or("-"),
            proxy = info.is_proxy,
            "resolved contract"
        );
        Ok(Resolution {
            info,
            cache_used: false,
        })
    }

    /// Forget a cached contract so the next resolve fetches it again
    pub fn invalidate(&self, address: &str, network: NetworkId) -> Result<(), ResolveError> {
        let address = normalize_address(address)
            .ok_or_else(|| ResolveError::InvalidAddress(address.to_string()))?;
        debug!(network, %address, "invalidating cached contract");
        self.cache.invalidate(network, &address);
        Ok(())
    }

    /// Like [`resolve`](Self::resolve), abandoned when the matching handle aborts
    pub async fn resolve_abortable(
        &self,
        address: &str,
        network: NetworkId,
        registration: AbortRegistration,
    ) -> Result<Resolution, ResolveError> {
        match Abortable::new(self.resolve(address, network), registration).await {
            Ok(result) => result,
            Err(_aborted) => {
                debug!(network, address, "resolution aborted");
                Err(ResolveError::Cancelled)
            }
        }
    }

    fn resolve_uncached<'a>(
        &'a self,
        address: String,
        network: NetworkId,
        depth: usize,
        staged: &'a mut Vec<ContractInfo>,
    ) -> BoxFuture<'a, Result<ContractInfo, ResolveError>> {
        async move {
            match self.source.fetch_verified_abi(&address, network).await {
                Ok(fetched) => {
                    self.resolve_verified(address, network, depth, fetched, staged)
                        .await
                }
                Err(SourceError::Unverified) => {
                    self.resolve_unverified(address, network, depth, staged)
                        .await
                }
                Err(SourceError::Transport(e)) => Err(ResolveError::TransportFailure(e)),
            }
        }
        .boxed()
    }

    async fn resolve_verified(
        &self,
        address: String,
        network: NetworkId,
        depth: usize,
        fetched: FetchedContract,
        staged: &mut Vec<ContractInfo>,
    ) -> Result<ContractInfo, ResolveError> {
        let abi = AbiParser::parse(&fetched.abi).ok();
        if abi.is_none() {
            warn!(network, %address, "source returned an ABI that does not parse");
        }
        let abi = abi.unwrap_or_default();

        let detection = match self.detector.detect(&address, network, &fetched, &abi).await {
            Ok(detection) => detection,
            Err(e) => {
                warn!(network, %address, error = %e, "proxy detection degraded to ABI shape");
                detect_from_abi(&abi).map(|kind| ProxyDetection {
                    kind,
                    implementation: None,
                })
            }
        };

        let mut info = ContractInfo {
            address: address.clone(),
            network,
            abi: fetched.abi,
            contract_name: fetched.contract_name,
            is_verified: fetched.is_verified,
            is_proxy: false,
            proxy_kind: None,
            implementation: None,
        };

        let Some(detection) = detection else {
            return Ok(info);
        };
        info.is_proxy = true;
        info.proxy_kind = Some(detection.kind);
        info.implementation = detection.implementation.clone();
        info!(
            network,
            %address,
            kind = %detection.kind,
            implementation = ?detection.implementation,
            "proxy detected"
        );

        let Some(implementation) = self.followable(&address, &detection, depth) else {
            return Ok(info);
        };
        match self
            .implementation_info(implementation, network, depth, staged)
            .await
        {
            Ok(target) => {
                info.abi = target.abi.clone();
                if target.contract_name.is_some() {
                    info.contract_name = target.contract_name.clone();
                }
            }
            Err(ResolveError::ContractUnverified { address: unverified, .. }) => {
                warn!(network, proxy = %address, implementation = %unverified,
                    "implementation not verified, keeping the proxy's own ABI");
            }
            Err(e) => return Err(e),
        }
        Ok(info)
    }

    async fn resolve_unverified(
        &self,
        address: String,
        network: NetworkId,
        depth: usize,
        staged: &mut Vec<ContractInfo>,
    ) -> Result<ContractInfo, ResolveError> {
        let unverified = || ResolveError::ContractUnverified {
            address: address.clone(),
            network,
        };

        let detection = self
            .detector
            .detect_unverified(&address, network)
            .await
            .map_err(|e| ResolveError::TransportFailure(e.to_string()))?;
        let Some(detection) = detection else {
            return Err(unverified());
        };
        let Some(implementation) = self.followable(&address, &detection, depth) else {
            return Err(unverified());
        };

        debug!(network, %address, %implementation, kind = %detection.kind,
            "unverified proxy, following implementation");
        let target = match self
            .implementation_info(implementation.clone(), network, depth, staged)
            .await
        {
            Ok(target) => target,
            Err(ResolveError::ContractUnverified { .. }) => return Err(unverified()),
            Err(e) => return Err(e),
        };

        Ok(ContractInfo {
            address,
            network,
            abi: target.abi.clone(),
            contract_name: target.contract_name.clone(),
            is_verified: false,
            is_proxy: true,
            proxy_kind: Some(detection.kind),
            implementation: Some(implementation),
        })
    }

    /// The implementation to follow, if any
    fn followable(
        &self,
        address: &str,
        detection: &ProxyDetection,
        depth: usize,
    ) -> Option<String> {
        let implementation = detection.implementation.as_deref()?;
        if implementation == address {
            return None;
        }
        if depth >= self.max_proxy_depth {
            warn!(%address, depth, "proxy depth limit reached");
            return None;
        }
        Some(implementation.to_string())
    }

    /// Implementation metadata from cache or a nested resolution (staged)
    async fn implementation_info(
        &self,
        implementation: String,
        network: NetworkId,
        depth: usize,
        staged: &mut Vec<ContractInfo>,
    ) -> Result<Arc<ContractInfo>, ResolveError> {
        if let Some(cached) = self.cache.get(network, &implementation) {
            return Ok(cached);
        }
        if let Some(pending) = staged
            .iter()
            .find(|info| info.network == network && info.address == implementation)
        {
            return Ok(Arc::new(pending.clone()));
        }
        let info = self
            .resolve_uncached(implementation, network, depth + 1, staged)
            .await?;
        staged.push(info.clone());
        Ok(Arc::new(info))
    }
}
