//! Protocol check strategies. One module per monitor type; `run_check`
//! dispatches on the parsed kind and bounds every probe with a timeout.

pub mod dns;
pub mod docker;
pub mod grpc;
pub mod http;
pub mod mqtt;
pub mod ping;
pub mod push;
pub mod radius;
pub mod sql;
pub mod tcp;

use std::time::Duration;

use sea_orm::DatabaseConnection;
use thiserror::Error;

use crate::db::entities::monitor;
use crate::monitor::status::Status;
use crate::net::NetError;
use crate::net::client_pool::HttpClientPool;

/// Closed set of monitor types. Unrecognized strings parse to `Unknown`,
/// which probes as PENDING instead of erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorKind {
    Http,
    Keyword,
    Tcp,
    Ping,
    Dns,
    Push,
    Steam,
    Docker,
    Mqtt,
    SqlServer,
    Postgres,
    Mysql,
    GrpcKeyword,
    Radius,
    Unknown,
}

impl MonitorKind {
    pub fn parse(raw: &str) -> MonitorKind {
        match raw {
            "http" => MonitorKind::Http,
            "keyword" => MonitorKind::Keyword,
            "port" => MonitorKind::Tcp,
            "ping" => MonitorKind::Ping,
            "dns" => MonitorKind::Dns,
            "push" => MonitorKind::Push,
            "steam" => MonitorKind::Steam,
            "docker" => MonitorKind::Docker,
            "mqtt" => MonitorKind::Mqtt,
            "sqlserver" => MonitorKind::SqlServer,
            "postgres" => MonitorKind::Postgres,
            "mysql" => MonitorKind::Mysql,
            "grpc-keyword" => MonitorKind::GrpcKeyword,
            "radius" => MonitorKind::Radius,
            _ => MonitorKind::Unknown,
        }
    }
}

/// What one bounded probe produced.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub status: Status,
    pub message: String,
    pub ping: Option<i32>,
}

impl CheckOutcome {
    pub fn up(message: impl Into<String>, ping: Option<i32>) -> CheckOutcome {
        CheckOutcome {
            status: Status::Up,
            message: message.into(),
            ping,
        }
    }
}

#[derive(Debug, Error)]
pub enum CheckError {
    /// The target is unreachable or unhealthy. Expected; drives the
    /// status/retry logic and never escalates as a system fault.
    #[error("{0}")]
    Probe(String),
    /// Broken or missing monitor configuration.
    #[error("invalid monitor configuration: {0}")]
    Config(String),
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error(transparent)]
    Net(#[from] NetError),
}

impl CheckError {
    pub(crate) fn probe(message: impl Into<String>) -> CheckError {
        CheckError::Probe(message.into())
    }

    pub(crate) fn config(message: impl Into<String>) -> CheckError {
        CheckError::Config(message.into())
    }
}

pub(crate) fn required<'a>(
    field: &'a Option<String>,
    name: &'static str,
) -> Result<&'a str, CheckError> {
    field
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CheckError::config(format!("{name} is not set")))
}

/// Run the check strategy for `monitor`'s type, bounded in time.
///
/// MQTT derives its bound from the monitor interval (the broker is given a
/// full cycle to deliver the expected message); everything else uses the
/// fleet-wide per-check timeout. Push monitors never reach this function;
/// the runner resolves them against the previous heartbeat.
pub async fn run_check(
    db: &DatabaseConnection,
    clients: &HttpClientPool,
    monitor: &monitor::Model,
    timeout: Duration,
) -> Result<CheckOutcome, CheckError> {
    let kind = MonitorKind::parse(&monitor.monitor_type);

    let bound = match kind {
        MonitorKind::Mqtt => Duration::from_secs(monitor.interval.max(1) as u64),
        _ => timeout,
    };

    let probe = dispatch(db, clients, monitor, timeout, kind);
    match tokio::time::timeout(bound, probe).await {
        Ok(result) => result,
        Err(_) => Err(CheckError::probe(format!(
            "check timed out after {} ms",
            bound.as_millis()
        ))),
    }
}

async fn dispatch(
    db: &DatabaseConnection,
    clients: &HttpClientPool,
    monitor: &monitor::Model,
    timeout: Duration,
    kind: MonitorKind,
) -> Result<CheckOutcome, CheckError> {
    match kind {
        MonitorKind::Http | MonitorKind::Keyword => {
            http::check_http(db, clients, monitor, timeout).await
        }
        MonitorKind::Tcp => tcp::check_tcp(monitor, timeout).await,
        MonitorKind::Ping => ping::check_ping(monitor, timeout).await,
        MonitorKind::Dns => dns::check_dns(db, monitor).await,
        MonitorKind::Steam => http::check_steam(db, clients, monitor, timeout).await,
        MonitorKind::Docker => docker::check_docker(db, monitor, timeout).await,
        MonitorKind::Mqtt => mqtt::check_mqtt(monitor).await,
        MonitorKind::SqlServer => sql::check_sqlserver(monitor).await,
        MonitorKind::Postgres => sql::check_postgres(monitor).await,
        MonitorKind::Mysql => sql::check_mysql(monitor).await,
        MonitorKind::GrpcKeyword => grpc::check_grpc_keyword(monitor, timeout).await,
        MonitorKind::Radius => radius::check_radius(monitor, timeout).await,
        MonitorKind::Push => Err(CheckError::config(
            "push monitors do not dispatch an outbound probe",
        )),
        MonitorKind::Unknown => Ok(CheckOutcome {
            status: Status::Pending,
            message: "Unknown Monitor Type".to_owned(),
            ping: None,
        }),
    }
}
