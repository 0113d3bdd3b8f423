use std::time::{Duration, Instant};

use crate::checks::{CheckError, CheckOutcome, required};
use crate::db::entities::monitor;

/// Plain TCP connect probe; ping is the connect latency.
pub async fn check_tcp(
    monitor: &monitor::Model,
    timeout: Duration,
) -> Result<CheckOutcome, CheckError> {
    let hostname = required(&monitor.hostname, "hostname")?;
    let port = monitor
        .port
        .ok_or_else(|| CheckError::config("port is not set"))?;

    let started = Instant::now();
    let attempt = tokio::time::timeout(
        timeout,
        tokio::net::TcpStream::connect((hostname, port as u16)),
    )
    .await;

    match attempt {
        Ok(Ok(_stream)) => Ok(CheckOutcome::up(
            "",
            Some(started.elapsed().as_millis() as i32),
        )),
        Ok(Err(e)) => Err(CheckError::probe(e.to_string())),
        Err(_) => Err(CheckError::probe("connection timed out")),
    }
}
