use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;
use sea_orm::{ConnectOptions, Database};
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use uptimed::config::AppConfig;
use uptimed::monitor::scheduler;
use uptimed::net::client_pool::HttpClientPool;
use uptimed::version::VERSION;

/// Pause after stopping the fleet so in-flight cycles can finish writing
/// their heartbeats.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(20);

/// Cadence for re-reading the persisted dnsCache setting.
const CLIENT_POOL_REFRESH: Duration = Duration::from_secs(60);

fn init_logging() {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily("logs", "uptimed.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    // Default to `info` with the noisy query logs damped when RUST_LOG is
    // not set.
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if std::env::args().any(|arg| arg == "--version") {
        println!("uptimed version: {VERSION}");
        return Ok(());
    }

    init_logging();
    info!("Starting uptimed, version: {}", VERSION);
    dotenv().ok();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let mut options = ConnectOptions::new(config.database_url.clone());
    options.max_connections(10);
    let db = Arc::new(Database::connect(options).await?);
    info!("Database connection established");

    let clients = Arc::new(HttpClientPool::new());
    if let Err(e) = clients.refresh(&db).await {
        warn!("Initial dnsCache setting read failed: {}", e);
    }
    {
        let clients = Arc::clone(&clients);
        let db = db.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(CLIENT_POOL_REFRESH);
            tick.tick().await; // immediate first tick already handled above
            loop {
                tick.tick().await;
                if let Err(e) = clients.refresh(&db).await {
                    warn!("dnsCache setting refresh failed: {}", e);
                }
            }
        });
    }

    let (fleet, report) = scheduler::start_monitors(&db, &clients, &config).await?;
    info!(
        started = report.started,
        skipped = report.skipped,
        sections = report.sections,
        "Monitor fleet is online"
    );

    wait_for_shutdown_signal().await;
    info!("Shutdown signal received, stopping monitor fleet");
    fleet.stop_all();

    tokio::time::sleep(SHUTDOWN_GRACE).await;
    info!("uptimed stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!("Failed to listen for SIGTERM: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
