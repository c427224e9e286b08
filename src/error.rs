//! Top-level error for the decode call patterns

use thiserror::Error;

use crate::domain::abi::AbiError;
use crate::domain::contract::ResolveError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Abi(#[from] AbiError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("transaction {tx_hash} creates a contract, there is no target ABI to decode against")]
    CreationTransaction { tx_hash: String },

    #[error("transaction {tx_hash} not found")]
    TransactionNotFound { tx_hash: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, Error>;
