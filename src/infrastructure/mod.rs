//! Infrastructure layer - External service integrations
//!
//! This layer contains:
//! - Sourcify ABI lookup and the contract resolver
//! - Alloy-based JSON-RPC access for transactions and proxy storage slots

pub mod abi;
pub mod ethereum;

pub use abi::{ContractResolver, SourcifyClient};
pub use ethereum::RpcClient;
