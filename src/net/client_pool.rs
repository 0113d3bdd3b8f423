use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use sea_orm::{DatabaseConnection, DbErr};
use tracing::{debug, warn};

use crate::net::NetError;
use crate::net::proxy::ProxySpec;

/// Option signature for one HTTP transport. Checks with identical options
/// share a pooled client while the DNS cache is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub timeout_ms: u64,
    pub accept_invalid_certs: bool,
    pub max_redirects: usize,
    pub proxy: Option<ProxySpec>,
}

/// Process-scoped cache of outbound HTTP clients.
///
/// Behaviour follows the `dnsCache` setting, polled via [`refresh`]:
/// while enabled, clients resolve hostnames through the hickory resolver's
/// in-process cache and are reused keyed by their option set; when the
/// setting turns off the cache is dropped and every check builds a fresh
/// client, so no stale resolver state survives the toggle.
///
/// [`refresh`]: HttpClientPool::refresh
pub struct HttpClientPool {
    dns_cache_enabled: AtomicBool,
    clients: DashMap<ClientKey, reqwest::Client>,
}

impl Default for HttpClientPool {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClientPool {
    pub fn new() -> Self {
        HttpClientPool {
            dns_cache_enabled: AtomicBool::new(false),
            clients: DashMap::new(),
        }
    }

    pub fn dns_cache_enabled(&self) -> bool {
        self.dns_cache_enabled.load(Ordering::Relaxed)
    }

    /// Re-read the `dnsCache` setting and reconcile the pool with it.
    pub async fn refresh(&self, db: &DatabaseConnection) -> Result<(), DbErr> {
        let enabled = crate::db::services::settings_service::dns_cache_enabled(db).await?;
        self.set_dns_cache(enabled);
        Ok(())
    }

    /// Direct toggle, exposed for the binary's poll loop and for tests.
    pub fn set_dns_cache(&self, enabled: bool) {
        let was = self.dns_cache_enabled.swap(enabled, Ordering::Relaxed);
        if was != enabled {
            debug!(enabled, "dns cache setting changed");
            if !enabled {
                // Drop every cached transport so no client keeps serving
                // answers from the now-disabled resolver cache.
                self.clients.clear();
            }
        }
    }

    pub fn cached_client_count(&self) -> usize {
        self.clients.len()
    }

    /// A client for the given option set. Pooled and DNS-cached while the
    /// setting is on, otherwise built per call.
    pub fn client(&self, key: &ClientKey) -> Result<reqwest::Client, NetError> {
        if !self.dns_cache_enabled() {
            return build_client(key, false);
        }

        if let Some(client) = self.clients.get(key) {
            return Ok(client.clone());
        }

        let client = build_client(key, true)?;
        self.clients.insert(key.clone(), client.clone());
        Ok(client)
    }
}

fn build_client(key: &ClientKey, hickory_dns: bool) -> Result<reqwest::Client, NetError> {
    let mut builder = reqwest::Client::builder()
        .timeout(Duration::from_millis(key.timeout_ms))
        .danger_accept_invalid_certs(key.accept_invalid_certs)
        .redirect(reqwest::redirect::Policy::limited(key.max_redirects))
        .hickory_dns(hickory_dns)
        .user_agent(format!("Uptimed/{}", crate::version::VERSION));

    if let Some(spec) = &key.proxy {
        builder = builder.proxy(spec.to_reqwest()?);
    }

    builder.build().map_err(|e| {
        warn!(error = %e, "failed to build HTTP client");
        NetError::Client(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(timeout_ms: u64) -> ClientKey {
        ClientKey {
            timeout_ms,
            accept_invalid_certs: false,
            max_redirects: 10,
            proxy: None,
        }
    }

    #[test]
    fn disabled_cache_builds_fresh_clients() {
        let pool = HttpClientPool::new();
        pool.client(&key(5000)).unwrap();
        pool.client(&key(5000)).unwrap();
        assert_eq!(pool.cached_client_count(), 0);
    }

    #[test]
    fn enabled_cache_reuses_by_option_set() {
        let pool = HttpClientPool::new();
        pool.set_dns_cache(true);
        pool.client(&key(5000)).unwrap();
        pool.client(&key(5000)).unwrap();
        pool.client(&key(9000)).unwrap();
        assert_eq!(pool.cached_client_count(), 2);
    }

    #[test]
    fn disabling_the_cache_evicts_patched_transports() {
        let pool = HttpClientPool::new();
        pool.set_dns_cache(true);
        pool.client(&key(5000)).unwrap();
        assert_eq!(pool.cached_client_count(), 1);

        pool.set_dns_cache(false);
        assert_eq!(pool.cached_client_count(), 0);
    }
}
