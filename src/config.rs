use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{0} is not a valid number: {1}")]
    Invalid(&'static str, String),
}

/// Environment-driven configuration for the check fleet.
///
/// `MONITOR_TIMEOUT` and `SECTION_TIME_SLEEP` are in milliseconds;
/// `MONITOR_PER_SECTION` is the outbound-request budget per scheduling
/// window (see the fleet scheduler).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub monitor_timeout_ms: u64,
    pub monitors_per_section: usize,
    pub section_sleep_ms: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let monitor_timeout_ms = parse_var("MONITOR_TIMEOUT")?;
        let monitors_per_section = parse_var("MONITOR_PER_SECTION")?;
        let section_sleep_ms = parse_var("SECTION_TIME_SLEEP")?;

        Ok(AppConfig {
            database_url,
            monitor_timeout_ms,
            monitors_per_section,
            section_sleep_ms,
        })
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.monitor_timeout_ms)
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str) -> Result<T, ConfigError> {
    let raw = env::var(name).map_err(|_| ConfigError::Missing(name))?;
    raw.parse()
        .map_err(|_| ConfigError::Invalid(name, raw.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_database_url_is_reported() {
        // Safety: tests in this module are the only writers of these vars.
        unsafe { env::remove_var("DATABASE_URL") };
        let err = AppConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }
}
