use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::contract::NetworkId;
use crate::infrastructure::abi::{DEFAULT_MAX_PROXY_DEPTH, DEFAULT_SOURCIFY_URL};
use crate::store::DEFAULT_TTL;
use crate::telemetry::LogConfig;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: NetworkId,
    pub rpc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourcifyConfig {
    #[serde(default = "default_sourcify_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Keep resolved contracts in SQLite across runs
    #[serde(default)]
    pub persist: bool,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_max_proxy_depth")]
    pub max_proxy_depth: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub networks: Vec<NetworkConfig>,

    #[serde(default)]
    pub sourcify: SourcifyConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub log: LogConfig,
}

fn default_sourcify_url() -> String {
    DEFAULT_SOURCIFY_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL.as_secs()
}

fn default_max_proxy_depth() -> usize {
    DEFAULT_MAX_PROXY_DEPTH
}

impl Default for SourcifyConfig {
    fn default() -> Self {
        Self {
            url: default_sourcify_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl SourcifyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            persist: false,
            path: None,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Database location: explicit path, else under the data dir
    pub fn db_path(&self) -> Option<PathBuf> {
        self.path.clone().or_else(cache_db_path)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_proxy_depth: default_max_proxy_depth(),
        }
    }
}

/// Networks known without any config file
const BUILTIN_NETWORKS: &[(&str, NetworkId, &str)] = &[
    ("mainnet", 1, "https://ethereum-rpc.publicnode.com"),
    ("sepolia", 11155111, "https://ethereum-sepolia-rpc.publicnode.com"),
    ("optimism", 10, "https://mainnet.optimism.io"),
    ("base", 8453, "https://mainnet.base.org"),
    ("arbitrum", 42161, "https://arb1.arbitrum.io/rpc"),
    ("polygon", 137, "https://polygon-rpc.com"),
];

pub fn builtin_networks() -> Vec<NetworkConfig> {
    BUILTIN_NETWORKS
        .iter()
        .map(|(name, chain_id, rpc)| NetworkConfig {
            name: name.to_string(),
            chain_id: *chain_id,
            rpc: Some(rpc.to_string()),
        })
        .collect()
}

impl Config {
    /// Configured networks first, then built-ins not overridden by them
    pub fn all_networks(&self) -> Vec<NetworkConfig> {
        let mut networks = self.networks.clone();
        for builtin in builtin_networks() {
            if !networks.iter().any(|n| {
                n.chain_id == builtin.chain_id || n.name.eq_ignore_ascii_case(&builtin.name)
            }) {
                networks.push(builtin);
            }
        }
        networks
    }

    /// Look a network up by name or chain id. An unknown numeric id yields a
    /// network without an RPC endpoint.
    pub fn network(&self, name_or_id: &str) -> Option<NetworkConfig> {
        let wanted = name_or_id.trim();
        let by_id = wanted.parse::<NetworkId>().ok();
        let found = self.all_networks().into_iter().find(|network| {
            network.name.eq_ignore_ascii_case(wanted) || Some(network.chain_id) == by_id
        });
        found.or_else(|| {
            by_id.map(|chain_id| NetworkConfig {
                name: chain_id.to_string(),
                chain_id,
                rpc: None,
            })
        })
    }
}

/// Load the config from the default location. Missing or unreadable files fall
/// back to defaults.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        return Config::default();
    };
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(_) => return Config::default(),
    };
    match toml::from_str::<Config>(&content) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring invalid config");
            Config::default()
        }
    }
}

/// Load a config file named explicitly; errors are reported
pub fn load_from(path: &Path) -> Result<Config> {
    let content =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parse config {}", path.display()))
}

pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("ABILENS_CONFIG").map(PathBuf::from) {
        return Some(path);
    }
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from) {
        return Some(xdg.join("abilens").join("config.toml"));
    }
    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        return Some(home.join(".config").join("abilens").join("config.toml"));
    }

    directories::ProjectDirs::from("io", "abilens", "abilens")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

pub fn data_dir() -> Option<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_DATA_HOME").map(PathBuf::from) {
        return Some(xdg.join("abilens"));
    }
    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        return Some(home.join(".local").join("share").join("abilens"));
    }
    directories::ProjectDirs::from("io", "abilens", "abilens")
        .map(|dirs| dirs.data_dir().to_path_buf())
}

pub fn cache_db_path() -> Option<PathBuf> {
    data_dir().map(|dir| dir.join("contracts.sqlite3"))
}
