//! Resolution errors

use thiserror::Error;

use super::NetworkId;

/// Why a contract could not be resolved.
///
/// "No verified source" and transport failures are kept apart so callers can
/// tell a missing ABI from a failed lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("contract {address} on chain {network} has no verified source")]
    ContractUnverified { address: String, network: NetworkId },

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    #[error("no RPC endpoint configured for chain {network}")]
    NoEndpoint { network: NetworkId },

    #[error("resolution cancelled")]
    Cancelled,
}
