//! Outbound-connection infrastructure shared across checks: proxy
//! transport construction and the DNS-cache-backed HTTP client pool.

pub mod client_pool;
pub mod proxy;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("unsupported proxy protocol provided: {0}")]
    UnsupportedProxyProtocol(String),
    #[error("failed to build proxy: {0}")]
    Proxy(#[source] reqwest::Error),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}
