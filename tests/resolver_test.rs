//! Contract resolution and the contract / transaction decode paths, run
//! against in-memory collaborators

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::B256;
use futures::future::AbortHandle;
use tokio::sync::Notify;

use abilens::domain::contract::{
    AbiSource, ChainReader, FetchedContract, NetworkId, ProxyHint, ProxyKind, ResolveError,
    SourceError, TransactionData, TransactionSource,
};
use abilens::infrastructure::abi::proxy::{
    EIP1167_PREFIX, EIP1167_SUFFIX, EIP1967_ADMIN_SLOT, EIP1967_IMPL_SLOT,
};
use abilens::infrastructure::ContractResolver;
use abilens::store::AbiCache;
use abilens::{App, DecodeRequest, Error};

const MAINNET: NetworkId = 1;

const PROXY: &str = "0x1111111111111111111111111111111111111111";
const IMPL: &str = "0x2222222222222222222222222222222222222222";
const PLAIN: &str = "0x3333333333333333333333333333333333333333";

const TOKEN_ABI: &str = r#"[{"type":"function","name":"transfer","inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],"outputs":[{"name":"","type":"bool"}]}]"#;
const PROXY_ABI: &str = r#"[
    {"type":"function","name":"upgradeTo","inputs":[{"name":"newImplementation","type":"address"}],"outputs":[]},
    {"type":"function","name":"admin","inputs":[],"outputs":[{"name":"","type":"address"}]}
]"#;

const TRANSFER_DATA: &str = "0xa9059cbb000000000000000000000000742d35cc6634c0532925a3b8d91b94e8a72c3b310000000000000000000000000000000000000000000000000de0b6b3a7640000";

#[derive(Default)]
struct FakeSource {
    contracts: HashMap<String, FetchedContract>,
    /// Fetches of this address never complete
    stall: Option<String>,
    started: Arc<Notify>,
    transport_down: bool,
    fetches: AtomicUsize,
}

impl FakeSource {
    fn with(mut self, address: &str, fetched: FetchedContract) -> Self {
        self.contracts.insert(address.to_string(), fetched);
        self
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AbiSource for FakeSource {
    async fn fetch_verified_abi(
        &self,
        address: &str,
        _network: NetworkId,
    ) -> Result<FetchedContract, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.transport_down {
            return Err(SourceError::Transport("connection refused".into()));
        }
        if self.stall.as_deref() == Some(address) {
            self.started.notify_one();
            futures::future::pending::<()>().await;
        }
        self.contracts
            .get(address)
            .cloned()
            .ok_or(SourceError::Unverified)
    }
}

#[derive(Default)]
struct FakeChain {
    code: HashMap<String, Vec<u8>>,
    storage: HashMap<(String, B256), B256>,
}

#[async_trait::async_trait]
impl ChainReader for FakeChain {
    fn supports(&self, network: NetworkId) -> bool {
        network == MAINNET
    }

    async fn code_at(&self, address: &str, _network: NetworkId) -> Result<Vec<u8>, SourceError> {
        Ok(self.code.get(address).cloned().unwrap_or_default())
    }

    async fn storage_at(
        &self,
        address: &str,
        slot: B256,
        _network: NetworkId,
    ) -> Result<B256, SourceError> {
        Ok(self
            .storage
            .get(&(address.to_string(), slot))
            .copied()
            .unwrap_or_default())
    }
}

#[derive(Default)]
struct FakeTransactions {
    transactions: HashMap<String, TransactionData>,
}

#[async_trait::async_trait]
impl TransactionSource for FakeTransactions {
    fn supports(&self, network: NetworkId) -> bool {
        network == MAINNET
    }

    async fn fetch_transaction(
        &self,
        tx_hash: &str,
        _network: NetworkId,
    ) -> Result<Option<TransactionData>, SourceError> {
        Ok(self.transactions.get(tx_hash).cloned())
    }
}

fn verified(abi: &str, name: &str) -> FetchedContract {
    FetchedContract {
        abi: abi.to_string(),
        contract_name: Some(name.to_string()),
        is_verified: true,
        ..Default::default()
    }
}

fn address_bytes(address: &str) -> Vec<u8> {
    hex::decode(address.trim_start_matches("0x")).unwrap()
}

fn clone_code(implementation: &str) -> Vec<u8> {
    let mut code = EIP1167_PREFIX.to_vec();
    code.extend(address_bytes(implementation));
    code.extend_from_slice(EIP1167_SUFFIX);
    code
}

fn address_word(address: &str) -> B256 {
    B256::left_padding_from(&address_bytes(address))
}

fn cache() -> Arc<AbiCache> {
    Arc::new(AbiCache::new(Duration::from_secs(3600)))
}

fn tx_hash(byte: &str) -> String {
    format!("0x{}", byte.repeat(32))
}

#[tokio::test]
async fn test_minimal_proxy_resolves_to_implementation() {
    let clone = FetchedContract {
        bytecode: Some(clone_code(IMPL)),
        ..verified("[]", "Clone")
    };
    let source = Arc::new(
        FakeSource::default()
            .with(PROXY, clone)
            .with(IMPL, verified(TOKEN_ABI, "Token")),
    );
    let resolver = ContractResolver::new(source.clone(), cache());

    let resolution = resolver.resolve(PROXY, MAINNET).await.unwrap();
    let info = &resolution.info;
    assert!(!resolution.cache_used);
    assert!(info.is_proxy);
    assert_eq!(info.proxy_kind, Some(ProxyKind::Minimal));
    assert_eq!(info.implementation.as_deref(), Some(IMPL));
    assert_eq!(info.abi, TOKEN_ABI);
    assert_eq!(info.contract_name.as_deref(), Some("Token"));
    assert_eq!(source.fetches(), 2);

    // Both the proxy and its implementation were cached
    assert_eq!(resolver.cache().len(), 2);
    assert!(resolver.cache().get(MAINNET, IMPL).is_some());
}

#[tokio::test]
async fn test_second_resolve_is_served_from_cache() {
    let source = Arc::new(FakeSource::default().with(PLAIN, verified(TOKEN_ABI, "Token")));
    let resolver = ContractResolver::new(source.clone(), cache());

    let first = resolver.resolve(PLAIN, MAINNET).await.unwrap();
    assert!(!first.cache_used);

    // Mixed case resolves to the same entry
    let second = resolver
        .resolve(&PLAIN.replace("0x", "0X"), MAINNET)
        .await
        .unwrap();
    assert!(second.cache_used);
    assert_eq!(second.info, first.info);
    assert_eq!(source.fetches(), 1);

    // Another network is a different key
    let other = resolver.resolve(PLAIN, 10).await.unwrap();
    assert!(!other.cache_used);
    assert_eq!(source.fetches(), 2);
}

#[tokio::test]
async fn test_invalidate_forces_refetch() {
    let source = Arc::new(FakeSource::default().with(PLAIN, verified(TOKEN_ABI, "Token")));
    let resolver = ContractResolver::new(source.clone(), cache());

    resolver.resolve(PLAIN, MAINNET).await.unwrap();
    resolver
        .invalidate(&PLAIN.replace("0x", "0X"), MAINNET)
        .unwrap();
    assert!(resolver.cache().is_empty());

    let again = resolver.resolve(PLAIN, MAINNET).await.unwrap();
    assert!(!again.cache_used);
    assert_eq!(source.fetches(), 2);

    assert!(matches!(
        resolver.invalidate("not an address", MAINNET),
        Err(ResolveError::InvalidAddress(_))
    ));
}

#[tokio::test]
async fn test_zero_ttl_never_hits() {
    let source = Arc::new(FakeSource::default().with(PLAIN, verified(TOKEN_ABI, "Token")));
    let resolver = ContractResolver::new(source.clone(), Arc::new(AbiCache::new(Duration::ZERO)));

    resolver.resolve(PLAIN, MAINNET).await.unwrap();
    let again = resolver.resolve(PLAIN, MAINNET).await.unwrap();
    assert!(!again.cache_used);
    assert_eq!(source.fetches(), 2);
}

#[tokio::test]
async fn test_unverified_contract() {
    let resolver = ContractResolver::new(Arc::new(FakeSource::default()), cache());

    let err = resolver.resolve(PLAIN, MAINNET).await.unwrap_err();
    assert_eq!(
        err,
        ResolveError::ContractUnverified {
            address: PLAIN.to_string(),
            network: MAINNET,
        }
    );
    assert!(resolver.cache().is_empty());
}

#[tokio::test]
async fn test_invalid_address() {
    let resolver = ContractResolver::new(Arc::new(FakeSource::default()), cache());
    assert!(matches!(
        resolver.resolve("0x1234", MAINNET).await,
        Err(ResolveError::InvalidAddress(_))
    ));
}

#[tokio::test]
async fn test_transport_failure_propagates() {
    let source = FakeSource {
        transport_down: true,
        ..Default::default()
    };
    let resolver = ContractResolver::new(Arc::new(source), cache());

    assert!(matches!(
        resolver.resolve(PLAIN, MAINNET).await,
        Err(ResolveError::TransportFailure(_))
    ));
    assert!(resolver.cache().is_empty());
}

#[tokio::test]
async fn test_unverified_clone_resolved_through_chain() {
    let source = Arc::new(FakeSource::default().with(IMPL, verified(TOKEN_ABI, "Token")));
    let chain = FakeChain {
        code: HashMap::from([(PROXY.to_string(), clone_code(IMPL))]),
        ..Default::default()
    };
    let resolver = ContractResolver::new(source, cache()).with_chain_reader(Arc::new(chain));

    let info = resolver.resolve(PROXY, MAINNET).await.unwrap().info;
    assert!(!info.is_verified);
    assert!(info.is_proxy);
    assert_eq!(info.proxy_kind, Some(ProxyKind::Minimal));
    assert_eq!(info.implementation.as_deref(), Some(IMPL));
    assert_eq!(info.abi, TOKEN_ABI);

    // Chain reader does not reach this network: plain unverified
    assert!(matches!(
        resolver.resolve(PROXY, 137).await,
        Err(ResolveError::ContractUnverified { network: 137, .. })
    ));
}

#[tokio::test]
async fn test_transparent_proxy_from_storage_slots() {
    let source = Arc::new(
        FakeSource::default()
            .with(PROXY, verified(PROXY_ABI, "TransparentUpgradeableProxy"))
            .with(IMPL, verified(TOKEN_ABI, "Token")),
    );
    let admin = "0x4444444444444444444444444444444444444444";
    let chain = FakeChain {
        code: HashMap::from([(PROXY.to_string(), vec![0x60, 0x80])]),
        storage: HashMap::from([
            ((PROXY.to_string(), EIP1967_IMPL_SLOT), address_word(IMPL)),
            ((PROXY.to_string(), EIP1967_ADMIN_SLOT), address_word(admin)),
        ]),
    };
    let resolver = ContractResolver::new(source, cache()).with_chain_reader(Arc::new(chain));

    let info = resolver.resolve(PROXY, MAINNET).await.unwrap().info;
    assert_eq!(info.proxy_kind, Some(ProxyKind::Transparent));
    assert_eq!(info.implementation.as_deref(), Some(IMPL));
    assert_eq!(info.abi, TOKEN_ABI);
    assert!(info.is_verified);
}

#[tokio::test]
async fn test_source_hint_without_chain_reader() {
    let proxy = FetchedContract {
        proxy_hint: Some(ProxyHint {
            label: "EIP1967Proxy".to_string(),
            implementation: Some(IMPL.to_uppercase().replace("0X", "0x")),
        }),
        ..verified(PROXY_ABI, "ERC1967Proxy")
    };
    let source = Arc::new(
        FakeSource::default()
            .with(PROXY, proxy)
            .with(IMPL, verified(TOKEN_ABI, "Token")),
    );
    let resolver = ContractResolver::new(source, cache());

    let info = resolver.resolve(PROXY, MAINNET).await.unwrap().info;
    assert_eq!(info.proxy_kind, Some(ProxyKind::Transparent));
    assert_eq!(info.implementation.as_deref(), Some(IMPL));
    assert_eq!(info.abi, TOKEN_ABI);
}

#[tokio::test]
async fn test_unverified_implementation_keeps_proxy_abi() {
    let proxy = FetchedContract {
        bytecode: Some(clone_code(IMPL)),
        ..verified(PROXY_ABI, "Clone")
    };
    let source = Arc::new(FakeSource::default().with(PROXY, proxy));
    let resolver = ContractResolver::new(source, cache());

    let info = resolver.resolve(PROXY, MAINNET).await.unwrap().info;
    assert!(info.is_proxy);
    assert_eq!(info.implementation.as_deref(), Some(IMPL));
    assert_eq!(info.abi, PROXY_ABI);
}

#[tokio::test]
async fn test_cancelled_resolution_leaves_cache_untouched() {
    let clone = FetchedContract {
        bytecode: Some(clone_code(IMPL)),
        ..verified("[]", "Clone")
    };
    let started = Arc::new(Notify::new());
    let source = FakeSource {
        stall: Some(IMPL.to_string()),
        started: started.clone(),
        ..Default::default()
    }
    .with(PROXY, clone);
    let resolver = ContractResolver::new(Arc::new(source), cache());

    let (handle, registration) = AbortHandle::new_pair();
    let (result, ()) = tokio::join!(
        resolver.resolve_abortable(PROXY, MAINNET, registration),
        async {
            // The proxy is fetched, the implementation fetch is in flight
            started.notified().await;
            handle.abort();
        }
    );

    assert_eq!(result.unwrap_err(), ResolveError::Cancelled);
    assert!(resolver.cache().is_empty());
}

fn app_with_transactions(transactions: FakeTransactions) -> App {
    let clone = FetchedContract {
        bytecode: Some(clone_code(IMPL)),
        ..verified("[]", "Clone")
    };
    let source = FakeSource::default()
        .with(PROXY, clone)
        .with(IMPL, verified(TOKEN_ABI, "Token"));
    let resolver = ContractResolver::new(Arc::new(source), cache());
    App::new(resolver).with_transactions(Arc::new(transactions))
}

#[tokio::test]
async fn test_decode_contract_through_proxy() {
    let app = app_with_transactions(FakeTransactions::default());

    let request = DecodeRequest::Contract {
        address: PROXY.to_string(),
        network: MAINNET,
        calldata: TRANSFER_DATA.to_string(),
    };
    let report = app.decode(request.clone()).await.unwrap();
    assert_eq!(report.signature, "transfer(address,uint256)");
    assert_eq!(report.args[1].value, "1000000000000000000");
    let contract = report.contract.as_ref().unwrap();
    assert!(contract.is_proxy);
    assert_eq!(contract.implementation.as_deref(), Some(IMPL));
    assert!(!report.cache_used);

    let again = app.decode(request).await.unwrap();
    assert!(again.cache_used);
}

#[tokio::test]
async fn test_decode_contract_rejects_bad_hex_before_lookup() {
    let app = app_with_transactions(FakeTransactions::default());
    let request = DecodeRequest::Contract {
        address: PROXY.to_string(),
        network: MAINNET,
        calldata: "0xnothex".to_string(),
    };
    assert!(matches!(app.decode(request).await, Err(Error::Abi(_))));
    assert!(app.resolver().cache().is_empty());
}

#[tokio::test]
async fn test_decode_transaction() {
    let hash = tx_hash("ab");
    let transactions = FakeTransactions {
        transactions: HashMap::from([(
            hash.clone(),
            TransactionData {
                hash: hash.clone(),
                from: Some(PLAIN.to_string()),
                to: Some(PROXY.to_string()),
                input: hex::decode(TRANSFER_DATA.trim_start_matches("0x")).unwrap(),
            },
        )]),
    };
    let app = app_with_transactions(transactions);

    let report = app
        .decode(DecodeRequest::Transaction {
            tx_hash: hash.to_uppercase().replace("0X", "0x"),
            network: MAINNET,
        })
        .await
        .unwrap();
    assert_eq!(report.function, "transfer");
    assert_eq!(report.tx_hash.as_deref(), Some(hash.as_str()));
    assert_eq!(report.contract.unwrap().address, PROXY);
}

#[tokio::test]
async fn test_decode_transaction_errors() {
    let creation = tx_hash("cd");
    let transactions = FakeTransactions {
        transactions: HashMap::from([(
            creation.clone(),
            TransactionData {
                hash: creation.clone(),
                from: Some(PLAIN.to_string()),
                to: None,
                input: vec![0x60, 0x80, 0x60, 0x40],
            },
        )]),
    };
    let app = app_with_transactions(transactions);

    assert_eq!(
        app.decode_transaction(&creation, MAINNET).await.unwrap_err(),
        Error::CreationTransaction {
            tx_hash: creation.clone()
        }
    );

    let missing = tx_hash("ef");
    assert_eq!(
        app.decode_transaction(&missing, MAINNET).await.unwrap_err(),
        Error::TransactionNotFound { tx_hash: missing }
    );

    assert_eq!(
        app.decode_transaction(&creation, 56).await.unwrap_err(),
        Error::Resolve(ResolveError::NoEndpoint { network: 56 })
    );

    assert!(matches!(
        app.decode_transaction("0x1234", MAINNET).await,
        Err(Error::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_decode_transaction_without_source() {
    let resolver = ContractResolver::new(Arc::new(FakeSource::default()), cache());
    let app = App::new(resolver);
    assert_eq!(
        app.decode_transaction(&tx_hash("ab"), MAINNET)
            .await
            .unwrap_err(),
        Error::Resolve(ResolveError::NoEndpoint { network: MAINNET })
    );
}
