//! abilens: decode Ethereum call data against verified contract ABIs
//!
//! - `domain`: ABI parsing, selector computation, decoding and formatting (pure),
//!   contract models and collaborator traits
//! - `infrastructure`: Sourcify lookup, proxy detection, the contract resolver,
//!   JSON-RPC access
//! - `store`: TTL cache of resolved contracts with optional SQLite persistence
//! - `app`: the manual / contract / transaction call patterns

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod export;
pub mod infrastructure;
pub mod store;
pub mod telemetry;

pub use app::{decode_manual, App, ContractSummary, DecodeReport, DecodeRequest};
pub use error::{Error, Result};
