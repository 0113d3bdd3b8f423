use std::net::IpAddr;
use std::time::Duration;

use rand::random;

use crate::checks::{CheckError, CheckOutcome, required};
use crate::db::entities::monitor;

/// ICMP echo probe.
pub async fn check_ping(
    monitor: &monitor::Model,
    timeout: Duration,
) -> Result<CheckOutcome, CheckError> {
    let hostname = required(&monitor.hostname, "hostname")?;
    let rtt = icmp_round_trip(hostname, timeout).await?;
    Ok(CheckOutcome::up("", Some(rtt)))
}

/// Resolve a host and send one echo request, returning the round trip in
/// milliseconds. Also used by the steam checker for its latency sample.
pub(crate) async fn icmp_round_trip(hostname: &str, timeout: Duration) -> Result<i32, CheckError> {
    let target = resolve(hostname).await?;

    let config = match target {
        IpAddr::V4(_) => surge_ping::Config::default(),
        IpAddr::V6(_) => surge_ping::Config::builder()
            .kind(surge_ping::ICMP::V6)
            .build(),
    };
    let client = surge_ping::Client::new(&config)
        .map_err(|e| CheckError::probe(format!("failed to open ICMP socket: {e}")))?;

    let mut pinger = client
        .pinger(target, surge_ping::PingIdentifier(random()))
        .await;
    pinger.timeout(timeout);

    match pinger.ping(surge_ping::PingSequence(0), &[]).await {
        Ok((_reply, duration)) => Ok(duration.as_millis() as i32),
        Err(e) => Err(CheckError::probe(e.to_string())),
    }
}

async fn resolve(hostname: &str) -> Result<IpAddr, CheckError> {
    if let Ok(ip) = hostname.parse::<IpAddr>() {
        return Ok(ip);
    }

    let mut addrs = tokio::net::lookup_host(format!("{hostname}:0"))
        .await
        .map_err(|e| CheckError::probe(format!("failed to resolve {hostname}: {e}")))?;
    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| CheckError::probe(format!("DNS returned no addresses for {hostname}")))
}
