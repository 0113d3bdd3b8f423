use std::time::{Duration, Instant};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, WWW_AUTHENTICATE};
use sea_orm::DatabaseConnection;
use serde_json::Value;
use tracing::debug;

use crate::checks::{CheckError, CheckOutcome, MonitorKind, required};
use crate::db::entities::monitor;
use crate::db::services::{proxy_service, settings_service};
use crate::net::client_pool::{ClientKey, HttpClientPool};
use crate::net::proxy::ProxySpec;

const STEAM_API_URL: &str = "https://api.steampowered.com/IGameServersService/GetServerList/v1/";

/// HTTP(S) probe, shared by the `http` and `keyword` types.
pub async fn check_http(
    db: &DatabaseConnection,
    clients: &HttpClientPool,
    monitor: &monitor::Model,
    timeout: Duration,
) -> Result<CheckOutcome, CheckError> {
    let url = required(&monitor.url, "url")?;
    let accepted = parse_accepted_statuscodes(&monitor.accepted_statuscodes_json)?;

    let client = clients.client(&client_key(db, monitor, timeout).await?)?;
    let request = build_request(&client, monitor, url)?;

    let started = Instant::now();
    let response = match monitor.auth_method.as_deref() {
        Some("ntlm") => send_with_ntlm(&client, monitor, url, request).await?,
        _ => request
            .send()
            .await
            .map_err(|e| CheckError::probe(e.to_string()))?,
    };
    let ping = started.elapsed().as_millis() as i32;

    let status_code = response.status();
    let message = format!(
        "{} - {}",
        status_code.as_u16(),
        status_code.canonical_reason().unwrap_or("Unknown")
    );

    if !check_status_code(status_code.as_u16(), &accepted) {
        return Err(CheckError::probe(message));
    }

    if MonitorKind::parse(&monitor.monitor_type) == MonitorKind::Keyword {
        let keyword = required(&monitor.keyword, "keyword")?.to_owned();
        let body = response
            .text()
            .await
            .map_err(|e| CheckError::probe(e.to_string()))?;

        if body.contains(&keyword) {
            return Ok(CheckOutcome::up(
                format!("{message}, keyword is found"),
                Some(ping),
            ));
        }
        return Err(CheckError::probe(format!(
            "{message}, but keyword is not in [{}]",
            keyword_snippet(&body)
        )));
    }

    Ok(CheckOutcome::up(message, Some(ping)))
}

/// Queries the Steam game-server list for the monitor's host:port and
/// opportunistically pings the host for a latency sample.
pub async fn check_steam(
    db: &DatabaseConnection,
    clients: &HttpClientPool,
    monitor: &monitor::Model,
    timeout: Duration,
) -> Result<CheckOutcome, CheckError> {
    let hostname = required(&monitor.hostname, "hostname")?;
    let port = monitor
        .port
        .ok_or_else(|| CheckError::config("port is not set"))?;

    let api_key = settings_service::steam_api_key(db)
        .await?
        .ok_or_else(|| CheckError::config("Steam API Key not found"))?;

    let key = ClientKey {
        timeout_ms: timeout.as_millis() as u64,
        accept_invalid_certs: monitor.ignore_tls,
        max_redirects: monitor.max_redirects.max(0) as usize,
        proxy: None,
    };
    let client = clients.client(&key)?;

    let filter = format!("addr\\{hostname}:{port}");
    let response = client
        .get(STEAM_API_URL)
        .query(&[("filter", filter.as_str()), ("key", api_key.as_str())])
        .send()
        .await
        .map_err(|e| CheckError::probe(e.to_string()))?;

    let payload: Value = response
        .json()
        .await
        .map_err(|e| CheckError::probe(e.to_string()))?;

    let server_name = payload
        .pointer("/response/servers/0/name")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| CheckError::probe("Server not found on Steam"))?;

    // Latency sample is best effort; an ICMP failure does not fail the check.
    let ping = match crate::checks::ping::icmp_round_trip(hostname, timeout).await {
        Ok(rtt) => Some(rtt),
        Err(e) => {
            debug!(monitor_id = monitor.id, error = %e, "steam host ping failed");
            None
        }
    };

    Ok(CheckOutcome::up(server_name, ping))
}

async fn client_key(
    db: &DatabaseConnection,
    monitor: &monitor::Model,
    timeout: Duration,
) -> Result<ClientKey, CheckError> {
    let mut proxy = None;
    if let Some(proxy_id) = monitor.proxy_id {
        if let Some(record) = proxy_service::get_proxy(db, proxy_id).await? {
            if record.active {
                proxy = Some(ProxySpec::from_record(&record)?);
            }
        }
    }

    Ok(ClientKey {
        timeout_ms: timeout.as_millis() as u64,
        accept_invalid_certs: monitor.ignore_tls,
        max_redirects: monitor.max_redirects.max(0) as usize,
        proxy,
    })
}

fn build_request(
    client: &reqwest::Client,
    monitor: &monitor::Model,
    url: &str,
) -> Result<reqwest::RequestBuilder, CheckError> {
    let method = reqwest::Method::from_bytes(monitor.method.to_uppercase().as_bytes())
        .map_err(|_| CheckError::config(format!("invalid HTTP method: {}", monitor.method)))?;

    let mut request = client.request(method, url).headers(default_headers());

    if let Some(raw) = monitor.headers.as_deref().filter(|h| !h.is_empty()) {
        request = request.headers(parse_headers(raw)?);
    }

    if let Some(raw) = monitor.body.as_deref().filter(|b| !b.is_empty()) {
        let body: Value = serde_json::from_str(raw)
            .map_err(|e| CheckError::config(format!("request body is not valid JSON: {e}")))?;
        request = request.json(&body);
    }

    if monitor.auth_method.as_deref() == Some("basic") {
        request = request.basic_auth(
            monitor.basic_auth_user.as_deref().unwrap_or_default(),
            monitor.basic_auth_pass.as_deref(),
        );
    }

    Ok(request)
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
    );
    headers
}

fn parse_headers(raw: &str) -> Result<HeaderMap, CheckError> {
    let parsed: serde_json::Map<String, Value> = serde_json::from_str(raw)
        .map_err(|e| CheckError::config(format!("headers are not a JSON object: {e}")))?;

    let mut headers = HeaderMap::new();
    for (name, value) in parsed {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| CheckError::config(format!("invalid header name: {name}")))?;
        let text = match value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        let value = HeaderValue::from_str(&text)
            .map_err(|_| CheckError::config(format!("invalid header value for {name}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Two-leg NTLM handshake over the already-built request. The first leg
/// carries the negotiate message; the server's challenge from
/// `WWW-Authenticate` feeds the authenticate message on the second leg.
async fn send_with_ntlm(
    client: &reqwest::Client,
    monitor: &monitor::Model,
    url: &str,
    first_request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, CheckError> {
    let username = required(&monitor.basic_auth_user, "basic_auth_user")?.to_owned();
    let password = monitor.basic_auth_pass.clone().unwrap_or_default();
    let domain = monitor.auth_domain.clone().unwrap_or_default();
    let workstation = monitor
        .auth_workstation
        .clone()
        .filter(|w| !w.is_empty())
        .unwrap_or_else(|| "UPTIMED".to_owned());

    let flags = ntlmclient::Flags::NEGOTIATE_UNICODE
        | ntlmclient::Flags::REQUEST_TARGET
        | ntlmclient::Flags::NEGOTIATE_NTLM
        | ntlmclient::Flags::NEGOTIATE_WORKSTATION_SUPPLIED;
    let negotiate = ntlmclient::Message::Negotiate(ntlmclient::NegotiateMessage {
        flags,
        supplied_domain: domain.clone(),
        supplied_workstation: workstation.clone(),
        os_version: Default::default(),
    });
    let negotiate_bytes = negotiate
        .to_bytes()
        .map_err(|e| CheckError::probe(format!("NTLM negotiate encoding failed: {e}")))?;

    let first = first_request
        .header(
            AUTHORIZATION,
            format!("NTLM {}", BASE64.encode(&negotiate_bytes)),
        )
        .send()
        .await
        .map_err(|e| CheckError::probe(e.to_string()))?;

    let challenge_b64 = first
        .headers()
        .get(WWW_AUTHENTICATE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("NTLM "))
        .map(str::to_owned)
        .ok_or_else(|| CheckError::probe("server did not offer an NTLM challenge"))?;
    let challenge_bytes = BASE64
        .decode(challenge_b64.trim())
        .map_err(|e| CheckError::probe(format!("bad NTLM challenge encoding: {e}")))?;

    let challenge = match ntlmclient::Message::try_from(&challenge_bytes[..]) {
        Ok(ntlmclient::Message::Challenge(c)) => c,
        Ok(_) => return Err(CheckError::probe("unexpected NTLM message from server")),
        Err(e) => {
            return Err(CheckError::probe(format!(
                "failed to parse NTLM challenge: {e}"
            )));
        }
    };

    let target_info: Vec<u8> = challenge
        .target_information
        .iter()
        .flat_map(|entry| entry.to_bytes())
        .collect();
    let credentials = ntlmclient::Credentials {
        username,
        password,
        domain,
    };
    let challenge_response = ntlmclient::respond_challenge_ntlm_v2(
        challenge.challenge,
        &target_info,
        ntlmclient::get_ntlm_time(),
        &credentials,
    );
    let authenticate = challenge_response.to_message(&credentials, &workstation, flags);
    let authenticate_bytes = authenticate
        .to_bytes()
        .map_err(|e| CheckError::probe(format!("NTLM authenticate encoding failed: {e}")))?;

    let second_request = build_request(client, monitor, url)?;
    second_request
        .header(
            AUTHORIZATION,
            format!("NTLM {}", BASE64.encode(&authenticate_bytes)),
        )
        .send()
        .await
        .map_err(|e| CheckError::probe(e.to_string()))
}

pub(crate) fn parse_accepted_statuscodes(raw: &str) -> Result<Vec<String>, CheckError> {
    if raw.is_empty() {
        return Ok(vec!["200-299".to_owned()]);
    }
    serde_json::from_str(raw)
        .map_err(|e| CheckError::config(format!("accepted status codes are not valid JSON: {e}")))
}

/// True when `status` falls in one of the accepted entries; entries are
/// either a single code (`"302"`) or an inclusive range (`"200-299"`).
pub(crate) fn check_status_code(status: u16, accepted: &[String]) -> bool {
    accepted.iter().any(|entry| match entry.split_once('-') {
        Some((start, end)) => {
            matches!(
                (start.parse::<u16>(), end.parse::<u16>()),
                (Ok(s), Ok(e)) if s <= status && status <= e
            )
        }
        None => entry.parse::<u16>().map(|c| c == status).unwrap_or(false),
    })
}

static SNIPPET_NOISE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]*>?|[\n\r]|\s+").expect("snippet regex is valid"));

/// Strip markup and whitespace runs from a response body and cap it at 50
/// characters for use inside a keyword-miss message.
pub(crate) fn keyword_snippet(body: &str) -> String {
    let cleaned = SNIPPET_NOISE.replace_all(body, " ");
    if cleaned.chars().count() > 50 {
        let head: String = cleaned.chars().take(47).collect();
        format!("{head}...")
    } else {
        cleaned.into_owned()
    }
}
