//! Local storage for resolved contracts

mod abi_cache;

pub use abi_cache::{AbiCache, AbiStore, DEFAULT_TTL};
