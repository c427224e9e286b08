//! ABI infrastructure - verified source lookup, proxy detection, resolution

pub mod proxy;
mod resolver;
mod sourcify;

pub use proxy::{ProxyDetection, ProxyDetector};
pub use resolver::{ContractResolver, DEFAULT_MAX_PROXY_DEPTH};
pub use sourcify::{SourcifyClient, DEFAULT_SOURCIFY_URL};
