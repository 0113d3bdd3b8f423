use std::time::{Duration, Instant};

use bollard::{API_DEFAULT_VERSION, Docker, container::InspectContainerOptions};
use sea_orm::DatabaseConnection;

use crate::checks::{CheckError, CheckOutcome, required};
use crate::db::entities::monitor;
use crate::db::services::docker_host_service;

/// Inspect a container on the monitor's docker host and report it up while
/// its state is `running`.
pub async fn check_docker(
    db: &DatabaseConnection,
    monitor: &monitor::Model,
    timeout: Duration,
) -> Result<CheckOutcome, CheckError> {
    let container = required(&monitor.docker_container, "docker_container")?;
    let host_id = monitor
        .docker_host
        .ok_or_else(|| CheckError::config("docker_host is not set"))?;

    let host = docker_host_service::get_docker_host(db, host_id)
        .await?
        .ok_or_else(|| CheckError::config(format!("docker host {host_id} not found")))?;
    let daemon = required(&host.docker_daemon, "docker_daemon")?;

    let timeout_secs = timeout.as_secs().max(1);
    let docker = match host.docker_type.as_deref() {
        Some("socket") => Docker::connect_with_socket(daemon, timeout_secs, API_DEFAULT_VERSION),
        Some("tcp") => Docker::connect_with_http(
            &docker_host_service::patch_docker_url(daemon),
            timeout_secs,
            API_DEFAULT_VERSION,
        ),
        other => {
            return Err(CheckError::config(format!(
                "unsupported docker connection type: {}",
                other.unwrap_or("unset")
            )));
        }
    }
    .map_err(|e| CheckError::probe(e.to_string()))?;

    let started = Instant::now();
    let info = docker
        .inspect_container(container, None::<InspectContainerOptions>)
        .await
        .map_err(|e| CheckError::probe(e.to_string()))?;
    let ping = started.elapsed().as_millis() as i32;

    let state = info.state.unwrap_or_default();
    if state.running.unwrap_or(false) {
        let message = state
            .health
            .and_then(|h| h.status)
            .map(|s| s.to_string())
            .unwrap_or_default();
        return Ok(CheckOutcome::up(message, Some(ping)));
    }

    let status = state
        .status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_owned());
    Err(CheckError::probe(format!("Container State is {status}")))
}
