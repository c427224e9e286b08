//! Resolved contract cache: in-memory TTL map with an optional SQLite tier

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::contract::{ContractInfo, NetworkId, ProxyKind};

/// Default time-to-live for a resolved contract
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

type CacheKey = (NetworkId, String);

#[derive(Debug, Clone)]
struct CacheEntry {
    info: Arc<ContractInfo>,
    inserted_at: DateTime<Utc>,
}

/// Process-wide cache of resolved contracts keyed by (network, lowercase address).
///
/// Entries are shared as `Arc<ContractInfo>` and replaced whole on write, so a
/// reader sees either the old or the new value. Expired entries behave as absent.
pub struct AbiCache {
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    store: Option<Mutex<AbiStore>>,
}

impl AbiCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
            store: None,
        }
    }

    /// Back the in-memory map with a persistent store
    pub fn with_store(mut self, store: AbiStore) -> Self {
        self.store = Some(Mutex::new(store));
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, network: NetworkId, address: &str) -> Option<Arc<ContractInfo>> {
        self.get_at(network, address, Utc::now())
    }

    /// Lookup as of `now`
    pub fn get_at(
        &self,
        network: NetworkId,
        address: &str,
        now: DateTime<Utc>,
    ) -> Option<Arc<ContractInfo>> {
        let key = cache_key(network, address);

        let stale = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(&key) {
                Some(entry) if !self.is_expired(entry.inserted_at, now) => {
                    debug!(network, address = %key.1, "cache hit");
                    return Some(entry.info.clone());
                }
                Some(_) => true,
                None => false,
            }
        };
        if stale {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            // A writer may have refreshed the entry since the read lock was released
            if entries
                .get(&key)
                .is_some_and(|entry| self.is_expired(entry.inserted_at, now))
            {
                debug!(network, address = %key.1, "dropping expired entry");
                entries.remove(&key);
            }
        }

        let (info, inserted_at) = self.load_persisted(&key)?;
        if self.is_expired(inserted_at, now) {
            return None;
        }
        debug!(network, address = %key.1, "cache hit (persistent)");
        let info = Arc::new(info);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key,
                CacheEntry {
                    info: info.clone(),
                    inserted_at,
                },
            );
        Some(info)
    }

    pub fn put(&self, info: ContractInfo) -> Arc<ContractInfo> {
        self.put_at(info, Utc::now())
    }

    pub fn put_at(&self, info: ContractInfo, now: DateTime<Utc>) -> Arc<ContractInfo> {
        let mut stored = self.put_all_at(vec![info], now);
        // put_all_at returns one Arc per input
        stored.remove(0)
    }

    /// Insert several entries with a single write lock and a single store transaction
    pub fn put_all(&self, infos: Vec<ContractInfo>) -> Vec<Arc<ContractInfo>> {
        self.put_all_at(infos, Utc::now())
    }

    pub fn put_all_at(
        &self,
        infos: Vec<ContractInfo>,
        now: DateTime<Utc>,
    ) -> Vec<Arc<ContractInfo>> {
        let infos: Vec<Arc<ContractInfo>> = infos.into_iter().map(Arc::new).collect();

        {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            for info in &infos {
                entries.insert(
                    cache_key(info.network, &info.address),
                    CacheEntry {
                        info: info.clone(),
                        inserted_at: now,
                    },
                );
            }
        }

        if let Some(mut store) = self.store_guard() {
            let rows: Vec<&ContractInfo> = infos.iter().map(|info| info.as_ref()).collect();
            if let Err(e) = store.save_all(&rows, now) {
                warn!(error = %e, "failed to persist resolved contracts");
            }
        }

        infos
    }

    /// Drop one entry from every tier
    pub fn invalidate(&self, network: NetworkId, address: &str) {
        let key = cache_key(network, address);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        if let Some(store) = self.store_guard() {
            if let Err(e) = store.delete(network, &key.1) {
                warn!(error = %e, "failed to delete persisted contract");
            }
        }
    }

    /// Remove expired entries from every tier, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut removed = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            let before = entries.len();
            entries.retain(|_, entry| !self.is_expired(entry.inserted_at, now));
            before - entries.len()
        };
        if let Some(store) = self.store_guard() {
            match store.purge_expired(now, self.ttl) {
                Ok(n) => removed += n,
                Err(e) => warn!(error = %e, "failed to purge persisted contracts"),
            }
        }
        removed
    }

    /// Number of entries held in memory (live or not yet purged)
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows held by the persistent store, if there is one
    pub fn persisted_len(&self) -> Option<usize> {
        let store = self.store_guard()?;
        match store.count() {
            Ok(n) => Some(n),
            Err(e) => {
                warn!(error = %e, "failed to count persisted contracts");
                None
            }
        }
    }

    fn is_expired(&self, inserted_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        // Clock going backwards counts as age zero
        let age = now
            .signed_duration_since(inserted_at)
            .to_std()
            .unwrap_or_default();
        age >= self.ttl
    }

    fn load_persisted(&self, key: &CacheKey) -> Option<(ContractInfo, DateTime<Utc>)> {
        let store = self.store_guard()?;
        match store.load(key.0, &key.1) {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "failed to read persisted contract");
                None
            }
        }
    }

    fn store_guard(&self) -> Option<MutexGuard<'_, AbiStore>> {
        self.store
            .as_ref()
            .map(|store| store.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Default for AbiCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

fn cache_key(network: NetworkId, address: &str) -> CacheKey {
    (network, address.trim().to_lowercase())
}

/// SQLite-backed persistent tier
#[derive(Debug)]
pub struct AbiStore {
    conn: Connection,
}

impl AbiStore {
    /// Open or create the cache database
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create cache dir {}", parent.display()))?;
        }
        let conn = Connection::open(path).with_context(|| format!("open db {}", path.display()))?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory().context("open in-memory db")?,
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS contracts (
                chain_id        INTEGER NOT NULL,
                address         TEXT NOT NULL,
                abi_json        TEXT NOT NULL,
                contract_name   TEXT,
                is_verified     INTEGER NOT NULL,
                is_proxy        INTEGER NOT NULL,
                proxy_kind      TEXT,
                implementation  TEXT,
                created_at      INTEGER NOT NULL,
                PRIMARY KEY (chain_id, address)
            );

            CREATE INDEX IF NOT EXISTS idx_contracts_created ON contracts(created_at);
            ",
        )?;
        Ok(())
    }

    /// Upsert a batch of contracts in one transaction
    pub fn save_all(&mut self, infos: &[&ContractInfo], created_at: DateTime<Utc>) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO contracts(chain_id, address, abi_json, contract_name, is_verified,
                                       is_proxy, proxy_kind, implementation, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(chain_id, address) DO UPDATE SET
                    abi_json=excluded.abi_json,
                    contract_name=excluded.contract_name,
                    is_verified=excluded.is_verified,
                    is_proxy=excluded.is_proxy,
                    proxy_kind=excluded.proxy_kind,
                    implementation=excluded.implementation,
                    created_at=excluded.created_at",
            )?;
            for info in infos {
                stmt.execute(params![
                    info.network,
                    info.address.to_lowercase(),
                    info.abi,
                    info.contract_name,
                    info.is_verified,
                    info.is_proxy,
                    info.proxy_kind.map(|kind| kind.as_str()),
                    info.implementation,
                    created_at.timestamp(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Load a contract and the time it was stored
    pub fn load(
        &self,
        chain_id: NetworkId,
        address: &str,
    ) -> Result<Option<(ContractInfo, DateTime<Utc>)>> {
        let row = self
            .conn
            .query_row(
                "SELECT chain_id, address, abi_json, contract_name, is_verified, is_proxy,
                        proxy_kind, implementation, created_at
                 FROM contracts WHERE chain_id = ?1 AND address = ?2",
                params![chain_id, address.to_lowercase()],
                |row| {
                    let proxy_kind: Option<String> = row.get(6)?;
                    let created_at: i64 = row.get(8)?;
                    Ok((
                        ContractInfo {
                            network: row.get(0)?,
                            address: row.get(1)?,
                            abi: row.get(2)?,
                            contract_name: row.get(3)?,
                            is_verified: row.get(4)?,
                            is_proxy: row.get(5)?,
                            proxy_kind: proxy_kind.as_deref().and_then(ProxyKind::parse),
                            implementation: row.get(7)?,
                        },
                        created_at,
                    ))
                },
            )
            .optional()?;

        Ok(row.and_then(|(info, created_at)| {
            DateTime::<Utc>::from_timestamp(created_at, 0).map(|at| (info, at))
        }))
    }

    pub fn delete(&self, chain_id: NetworkId, address: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM contracts WHERE chain_id = ?1 AND address = ?2",
            params![chain_id, address.to_lowercase()],
        )?;
        Ok(())
    }

    /// Delete rows whose age is at least `ttl`
    pub fn purge_expired(&self, now: DateTime<Utc>, ttl: Duration) -> Result<usize> {
        let cutoff = now.timestamp() - i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let deleted = self.conn.execute(
            "DELETE FROM contracts WHERE created_at <= ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM contracts", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
