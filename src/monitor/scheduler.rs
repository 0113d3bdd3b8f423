use std::sync::Arc;
use std::time::Duration;

use sea_orm::{DatabaseConnection, DbErr};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::db::entities::monitor;
use crate::db::services::monitor_service;
use crate::monitor::runner::{StopHandle, spawn_runner};
use crate::net::client_pool::HttpClientPool;

/// Number of startup batches the admitted fleet is split into.
const SECTION_COUNT: usize = 10;

/// Extra pause on top of the per-check timeout between section launches.
const SECTION_LAUNCH_GRACE_MS: u64 = 1_000;

/// Admission-control numbers derived from the configured check budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleLimits {
    pub section_duration_ms: u64,
    pub sections_per_minute: u64,
    pub max_monitors: usize,
}

/// How fleet startup went: monitors over `max_monitors` are deliberately not
/// started, and the count is surfaced here rather than silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FleetReport {
    pub started: usize,
    pub skipped: usize,
    pub sections: usize,
}

/// Owns every running monitor's stop handle and join handle.
pub struct Fleet {
    runners: Vec<(i32, Arc<StopHandle>, JoinHandle<()>)>,
}

impl Fleet {
    pub fn len(&self) -> usize {
        self.runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }

    /// Flag every runner to stop. In-flight cycles finish on their own; the
    /// caller decides how long to wait for them.
    pub fn stop_all(&self) {
        for (monitor_id, stop, _) in &self.runners {
            info!(monitor_id = *monitor_id, "stopping monitor runner");
            stop.stop();
        }
    }
}

/// With a per-check timeout `T` ms, an inter-section sleep `S` ms and a
/// budget of `per_section` outbound requests per scheduling window, the fleet
/// may hold at most `floor(60000 / (T + S)) * per_section` monitors.
pub fn compute_limits(timeout_ms: u64, section_sleep_ms: u64, per_section: usize) -> ScheduleLimits {
    let section_duration_ms = timeout_ms + section_sleep_ms;
    let sections_per_minute = 60_000 / section_duration_ms.max(1);
    ScheduleLimits {
        section_duration_ms,
        sections_per_minute,
        max_monitors: sections_per_minute as usize * per_section,
    }
}

/// Split the admitted monitors into up to `SECTION_COUNT` roughly equal
/// contiguous sections.
fn partition(monitors: Vec<monitor::Model>) -> Vec<Vec<monitor::Model>> {
    let chunk = monitors.len().div_ceil(SECTION_COUNT).max(1);
    let mut sections = Vec::new();
    let mut rest = monitors;
    while !rest.is_empty() {
        let tail = rest.split_off(chunk.min(rest.len()));
        sections.push(rest);
        rest = tail;
    }
    sections
}

/// Load every active monitor and bring its runner online in staggered
/// sections so startup does not open the whole fleet's sockets at once.
pub async fn start_monitors(
    db: &Arc<DatabaseConnection>,
    clients: &Arc<HttpClientPool>,
    config: &AppConfig,
) -> Result<(Fleet, FleetReport), DbErr> {
    let limits = compute_limits(
        config.monitor_timeout_ms,
        config.section_sleep_ms,
        config.monitors_per_section,
    );

    let mut monitors = monitor_service::get_active_monitors(db).await?;
    let skipped = monitors.len().saturating_sub(limits.max_monitors);
    if skipped > 0 {
        warn!(
            skipped,
            capacity = limits.max_monitors,
            "active monitors exceed startup capacity, excess will not be started"
        );
        monitors.truncate(limits.max_monitors);
    }

    let sections = partition(monitors);
    let pause = Duration::from_millis(config.monitor_timeout_ms + SECTION_LAUNCH_GRACE_MS);
    let check_timeout = config.check_timeout();

    let mut runners = Vec::new();
    for (index, section) in sections.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(pause).await;
        }
        info!(
            section = index,
            monitors = section.len(),
            "starting monitor section"
        );
        for monitor in section {
            let (stop, handle) = spawn_runner(db.clone(), Arc::clone(clients), monitor, check_timeout);
            runners.push((monitor.id, stop, handle));
        }
    }

    let report = FleetReport {
        started: runners.len(),
        skipped,
        sections: sections.len(),
    };
    Ok((Fleet { runners }, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitors(count: usize) -> Vec<monitor::Model> {
        (0..count)
            .map(|i| monitor::Model {
                id: i as i32,
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn limits_match_the_budget_arithmetic() {
        let limits = compute_limits(5_000, 1_000, 10);
        assert_eq!(limits.section_duration_ms, 6_000);
        assert_eq!(limits.sections_per_minute, 10);
        assert_eq!(limits.max_monitors, 100);
    }

    #[test]
    fn oversized_fleet_is_truncated_not_dropped_silently() {
        let limits = compute_limits(5_000, 1_000, 10);
        let active = 250usize;
        let started = active.min(limits.max_monitors);
        assert_eq!(started, 100);
        assert_eq!(active - started, 150);
    }

    #[test]
    fn partition_is_contiguous_and_roughly_equal() {
        let sections = partition(monitors(100));
        assert_eq!(sections.len(), 10);
        assert!(sections.iter().all(|s| s.len() == 10));

        // order preserved across section boundaries
        assert_eq!(sections[0][0].id, 0);
        assert_eq!(sections[3][0].id, 30);
        assert_eq!(sections[9][9].id, 99);
    }

    #[test]
    fn small_fleets_use_fewer_sections() {
        let sections = partition(monitors(7));
        assert_eq!(sections.len(), 7);
        assert!(sections.iter().all(|s| s.len() == 1));

        assert!(partition(monitors(0)).is_empty());
    }

    #[test]
    fn uneven_fleets_round_up_chunk_size() {
        let sections = partition(monitors(105));
        assert_eq!(sections.len(), 10);
        assert_eq!(sections[0].len(), 11);
        assert_eq!(sections.iter().map(Vec::len).sum::<usize>(), 105);
    }
}
