use std::time::Instant;

use sqlx::{Connection, Executor, MySqlConnection, PgConnection};
use tokio_util::compat::TokioAsyncWriteCompatExt;

use crate::checks::{CheckError, CheckOutcome, required};
use crate::db::entities::monitor;

const DEFAULT_QUERY: &str = "SELECT 1";

/// Connect and run the configured query (or `SELECT 1`); ping covers the
/// whole connect-and-query round trip.
pub async fn check_postgres(monitor: &monitor::Model) -> Result<CheckOutcome, CheckError> {
    let dsn = required(&monitor.database_connection_string, "database_connection_string")?;
    let query = query_of(monitor);

    let started = Instant::now();
    let mut conn = PgConnection::connect(dsn)
        .await
        .map_err(|e| CheckError::probe(e.to_string()))?;
    let result = conn.execute(query).await;
    let _ = conn.close().await;
    result.map_err(|e| CheckError::probe(e.to_string()))?;

    Ok(CheckOutcome::up("", Some(started.elapsed().as_millis() as i32)))
}

pub async fn check_mysql(monitor: &monitor::Model) -> Result<CheckOutcome, CheckError> {
    let dsn = required(&monitor.database_connection_string, "database_connection_string")?;
    let query = query_of(monitor);

    let started = Instant::now();
    let mut conn = MySqlConnection::connect(dsn)
        .await
        .map_err(|e| CheckError::probe(e.to_string()))?;
    let result = conn.execute(query).await;
    let _ = conn.close().await;
    result.map_err(|e| CheckError::probe(e.to_string()))?;

    Ok(CheckOutcome::up("", Some(started.elapsed().as_millis() as i32)))
}

/// SQL Server speaks TDS, not the sqlx wire protocols, so this one goes
/// through tiberius over a raw tokio socket.
pub async fn check_sqlserver(monitor: &monitor::Model) -> Result<CheckOutcome, CheckError> {
    let dsn = required(&monitor.database_connection_string, "database_connection_string")?;
    let query = query_of(monitor);

    let config = tiberius::Config::from_ado_string(dsn)
        .map_err(|e| CheckError::config(format!("invalid connection string: {e}")))?;

    let started = Instant::now();
    let tcp = tokio::net::TcpStream::connect(config.get_addr())
        .await
        .map_err(|e| CheckError::probe(e.to_string()))?;
    tcp.set_nodelay(true)
        .map_err(|e| CheckError::probe(e.to_string()))?;

    let mut client = tiberius::Client::connect(config, tcp.compat_write())
        .await
        .map_err(|e| CheckError::probe(e.to_string()))?;
    client
        .simple_query(query)
        .await
        .map_err(|e| CheckError::probe(e.to_string()))?
        .into_results()
        .await
        .map_err(|e| CheckError::probe(e.to_string()))?;

    Ok(CheckOutcome::up("", Some(started.elapsed().as_millis() as i32)))
}

fn query_of(monitor: &monitor::Model) -> &str {
    monitor
        .database_query
        .as_deref()
        .filter(|q| !q.trim().is_empty())
        .unwrap_or(DEFAULT_QUERY)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_with_query(query: Option<&str>) -> monitor::Model {
        monitor::Model {
            database_query: query.map(str::to_owned),
            ..Default::default()
        }
    }

    #[test]
    fn falls_back_to_select_one() {
        assert_eq!(query_of(&model_with_query(None)), "SELECT 1");
        assert_eq!(query_of(&model_with_query(Some("   "))), "SELECT 1");
    }

    #[test]
    fn configured_query_wins() {
        assert_eq!(
            query_of(&model_with_query(Some("SELECT version()"))),
            "SELECT version()"
        );
    }
}
