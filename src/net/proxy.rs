use crate::db::entities::proxy;
use crate::net::NetError;

/// Resolved proxy parameters for one outbound transport. Hashable so the
/// client pool can key cached transports on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxySpec {
    pub scheme: &'static str,
    pub host: String,
    pub port: u16,
    pub auth: Option<(String, String)>,
}

impl ProxySpec {
    /// Maps a stored proxy record onto a transport spec. The bare `socks`
    /// protocol means SOCKS5; unsupported protocol strings fail fast
    /// rather than silently probing without the proxy.
    pub fn from_record(record: &proxy::Model) -> Result<ProxySpec, NetError> {
        let scheme = match record.protocol.as_str() {
            "http" => "http",
            "https" => "https",
            "socks" | "socks5" => "socks5",
            "socks5h" => "socks5h",
            "socks4" => "socks4",
            other => return Err(NetError::UnsupportedProxyProtocol(other.to_owned())),
        };

        let auth = if record.auth {
            Some((
                record.username.clone().unwrap_or_default(),
                record.password.clone().unwrap_or_default(),
            ))
        } else {
            None
        };

        Ok(ProxySpec {
            scheme,
            host: record.host.clone(),
            port: record.port as u16,
            auth,
        })
    }

    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    pub fn to_reqwest(&self) -> Result<reqwest::Proxy, NetError> {
        let mut proxy = reqwest::Proxy::all(self.url()).map_err(NetError::Proxy)?;
        if let Some((username, password)) = &self.auth {
            proxy = proxy.basic_auth(username, password);
        }
        Ok(proxy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(protocol: &str, auth: bool) -> proxy::Model {
        proxy::Model {
            id: 1,
            user_id: 1,
            protocol: protocol.to_owned(),
            host: "proxy.internal".to_owned(),
            port: 1080,
            auth,
            username: auth.then(|| "user".to_owned()),
            password: auth.then(|| "pass".to_owned()),
            active: true,
            is_default: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn socks_aliases_map_to_socks5() {
        let spec = ProxySpec::from_record(&record("socks", false)).unwrap();
        assert_eq!(spec.scheme, "socks5");
        let spec = ProxySpec::from_record(&record("socks5", false)).unwrap();
        assert_eq!(spec.scheme, "socks5");
    }

    #[test]
    fn socks_variants_are_distinct_transports() {
        assert_eq!(
            ProxySpec::from_record(&record("socks5h", false))
                .unwrap()
                .scheme,
            "socks5h"
        );
        assert_eq!(
            ProxySpec::from_record(&record("socks4", false))
                .unwrap()
                .scheme,
            "socks4"
        );
    }

    #[test]
    fn unsupported_protocol_fails_fast() {
        let err = ProxySpec::from_record(&record("quic", false)).unwrap_err();
        assert!(matches!(err, NetError::UnsupportedProxyProtocol(p) if p == "quic"));
    }

    #[test]
    fn credentials_are_carried_when_auth_is_set() {
        let spec = ProxySpec::from_record(&record("http", true)).unwrap();
        assert_eq!(
            spec.auth,
            Some(("user".to_owned(), "pass".to_owned()))
        );
        assert_eq!(spec.url(), "http://proxy.internal:1080");
    }
}
