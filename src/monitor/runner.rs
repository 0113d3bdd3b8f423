use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use sea_orm::{DatabaseConnection, DbErr};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::checks::push::PushVerdict;
use crate::checks::{self, CheckError, MonitorKind};
use crate::db::entities::{heartbeat, monitor};
use crate::db::services::{heartbeat_service, monitor_service};
use crate::monitor::status::{Status, is_important_beat};
use crate::net::client_pool::HttpClientPool;

pub(crate) const MIN_INTERVAL_SECS: i64 = 20;
pub(crate) const MAX_INTERVAL_SECS: i64 = 2_073_600;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("database error: {0}")]
    Db(#[from] DbErr),
}

/// Cooperative stop flag shared between a runner and its owner. `stop()` is
/// idempotent and safe from any task; an in-flight cycle finishes its current
/// step but never reschedules afterwards.
#[derive(Debug, Default)]
pub struct StopHandle {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopHandle {
    pub fn new() -> StopHandle {
        StopHandle::default()
    }

    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless stopped first. Returns true when the
    /// runner should shut down instead of continuing.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        if self.is_stopped() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_stopped(),
            _ = &mut notified => true,
        }
    }
}

/// Everything the retry/importance bookkeeping needs to settle one probe
/// result, separated from the I/O so the policy is testable on its own.
#[derive(Debug, Clone)]
pub(crate) struct CycleInput {
    pub upside_down: bool,
    pub max_retries: i32,
    pub resend_interval: i32,
    pub is_first_beat: bool,
    pub previous_status: Option<Status>,
    pub previous_down_count: i32,
    pub retries: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CycleVerdict {
    pub status: Status,
    pub retries: i32,
    pub important: bool,
    pub down_count: i32,
    pub resend_due: bool,
}

/// Apply upside-down inversion, the retry budget and the importance table to
/// a raw probe status.
///
/// PENDING may only be entered while the previous persisted status is not
/// DOWN: the counter increments first and the beat stays PENDING while
/// `retries < max_retries`. Once the budget is spent the beat is DOWN and the
/// counter resets, so every further failure in the streak is DOWN as well,
/// even if `max_retries` is edited mid-streak.
pub(crate) fn settle(input: &CycleInput, probe_status: Status) -> CycleVerdict {
    let mut status = if input.upside_down {
        probe_status.flip()
    } else {
        probe_status
    };
    let mut retries = input.retries;

    match status {
        Status::Up => retries = 0,
        Status::Down => {
            if input.max_retries > 0 && input.previous_status != Some(Status::Down) {
                retries += 1;
                if retries < input.max_retries {
                    status = Status::Pending;
                } else {
                    retries = 0;
                }
            } else {
                retries = 0;
            }
        }
        _ => {}
    }

    let important = is_important_beat(input.is_first_beat, input.previous_status, status);

    let mut down_count = input.previous_down_count;
    let mut resend_due = false;
    if important {
        down_count = 0;
    } else if status == Status::Down && input.resend_interval > 0 {
        down_count += 1;
        if down_count >= input.resend_interval {
            resend_due = true;
            down_count = 0;
        }
    }

    CycleVerdict {
        status,
        retries,
        important,
        down_count,
        resend_due,
    }
}

/// Clamp a configured interval into `[MIN_INTERVAL_SECS, MAX_INTERVAL_SECS]`.
/// Unset (zero or negative) defaults to 1 second first, so it floors like any
/// other too-small value. The bool reports whether flooring happened.
pub(crate) fn effective_interval_secs(raw: i32) -> (u64, bool) {
    let configured = if raw <= 0 { 1 } else { i64::from(raw) };
    if configured < MIN_INTERVAL_SECS {
        (MIN_INTERVAL_SECS as u64, true)
    } else {
        (configured.min(MAX_INTERVAL_SECS) as u64, false)
    }
}

/// One monitor's check loop. Owns its previous beat and retry counter
/// exclusively; the only outside influence is the stop handle.
pub struct MonitorRunner {
    db: Arc<DatabaseConnection>,
    clients: Arc<HttpClientPool>,
    monitor_id: i32,
    check_timeout: Duration,
    stop: Arc<StopHandle>,
    previous_beat: Option<heartbeat::Model>,
    retries: i32,
    first_cycle: bool,
    last_interval: Duration,
}

/// Spawn the loop for one monitor and hand back its stop handle.
pub fn spawn_runner(
    db: Arc<DatabaseConnection>,
    clients: Arc<HttpClientPool>,
    monitor: &monitor::Model,
    check_timeout: Duration,
) -> (Arc<StopHandle>, JoinHandle<()>) {
    let stop = Arc::new(StopHandle::new());
    let (interval_secs, _) = effective_interval_secs(monitor.interval);
    let runner = MonitorRunner {
        db,
        clients,
        monitor_id: monitor.id,
        check_timeout,
        stop: Arc::clone(&stop),
        previous_beat: None,
        retries: 0,
        first_cycle: true,
        last_interval: Duration::from_secs(interval_secs),
    };
    let handle = tokio::spawn(runner.run());
    (stop, handle)
}

impl MonitorRunner {
    async fn run(mut self) {
        info!(monitor_id = self.monitor_id, "monitor runner started");
        loop {
            if self.stop.is_stopped() {
                break;
            }
            match self.cycle().await {
                Ok(Some(delay)) => {
                    if self.stop.sleep(delay).await {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    // Self-heal: log and come back after one interval instead
                    // of taking the runner down with an internal fault.
                    error!(
                        monitor_id = self.monitor_id,
                        error = %e,
                        "monitor cycle failed, rescheduling after one interval"
                    );
                    if self.stop.sleep(self.last_interval).await {
                        break;
                    }
                }
            }
        }
        info!(monitor_id = self.monitor_id, "monitor runner stopped");
    }

    /// One full check cycle. Returns the delay before the next cycle, or
    /// `None` when the monitor is gone and the loop should end.
    async fn cycle(&mut self) -> Result<Option<Duration>, RunnerError> {
        // Configuration is edited concurrently by external management, so
        // each cycle starts from the latest persisted monitor.
        let Some(monitor) = monitor_service::get_monitor_by_id(&self.db, self.monitor_id).await?
        else {
            info!(monitor_id = self.monitor_id, "monitor deleted, stopping runner");
            return Ok(None);
        };
        if !monitor.active {
            info!(monitor_id = self.monitor_id, "monitor deactivated, stopping runner");
            return Ok(None);
        }

        let (interval_secs, floored) = effective_interval_secs(monitor.interval);
        if floored {
            warn!(
                monitor_id = monitor.id,
                configured = monitor.interval,
                floor = MIN_INTERVAL_SECS,
                "monitor interval below the minimum, flooring"
            );
        }
        self.last_interval = Duration::from_secs(interval_secs);

        let kind = MonitorKind::parse(&monitor.monitor_type);

        if self.first_cycle {
            self.first_cycle = false;
            self.previous_beat =
                heartbeat_service::latest_for_monitor(&self.db, monitor.id).await?;
            if kind == MonitorKind::Push {
                // Give the external caller one full window before judging.
                return Ok(Some(self.last_interval));
            }
        }

        let cycle_started = Instant::now();
        let now = Utc::now();

        let probe = if kind == MonitorKind::Push {
            // Push state must be current: the beat we carry in memory may be
            // older than one the push endpoint just appended.
            self.previous_beat =
                heartbeat_service::latest_for_monitor(&self.db, monitor.id).await?;
            let previous = self.previous_beat.as_ref().map(|beat| {
                let status = Status::from_i16(beat.status).unwrap_or(Status::Down);
                (status, (now - beat.time).num_milliseconds())
            });
            match checks::push::evaluate(interval_secs as i32, monitor.upside_down, previous) {
                PushVerdict::Fresh { next_check_ms } => {
                    self.retries = 0;
                    return Ok(Some(Duration::from_millis(next_check_ms)));
                }
                PushVerdict::Stale => Err(CheckError::probe("No heartbeat in the time window")),
            }
        } else {
            checks::run_check(&self.db, &self.clients, &monitor, self.check_timeout).await
        };

        let (probe_status, message, ping) = match probe {
            Ok(outcome) => (outcome.status, outcome.message, outcome.ping),
            // Database trouble is an internal fault, not a probe verdict.
            Err(CheckError::Db(e)) => return Err(e.into()),
            Err(e) => (Status::Down, e.to_string(), None),
        };

        let input = CycleInput {
            upside_down: monitor.upside_down,
            max_retries: monitor.max_retries,
            resend_interval: monitor.resend_interval,
            is_first_beat: self.previous_beat.is_none(),
            previous_status: self
                .previous_beat
                .as_ref()
                .and_then(|beat| Status::from_i16(beat.status)),
            previous_down_count: self
                .previous_beat
                .as_ref()
                .map(|beat| beat.down_count)
                .unwrap_or(0),
            retries: self.retries,
        };
        let verdict = settle(&input, probe_status);
        self.retries = verdict.retries;

        if verdict.important {
            info!(
                monitor_id = monitor.id,
                status = %verdict.status,
                msg = %message,
                "monitor status changed"
            );
        } else {
            debug!(
                monitor_id = monitor.id,
                status = %verdict.status,
                ping = ?ping,
                "monitor checked"
            );
        }
        if verdict.resend_due {
            // The runner only marks the event; an external notifier consumes
            // the persisted beat.
            warn!(
                monitor_id = monitor.id,
                resend_interval = monitor.resend_interval,
                "monitor still down, repeat notification due"
            );
        }

        let beat = heartbeat::Model {
            id: 0,
            monitor_id: monitor.id,
            status: verdict.status.as_i16(),
            msg: message,
            time: now,
            ping,
            duration: cycle_started.elapsed().as_millis() as i32,
            important: verdict.important,
            down_count: verdict.down_count,
        };

        // Fire and forget: a failed write is logged and the next cycle's
        // write is an independent attempt.
        let db = self.db.clone();
        let persisted = beat.clone();
        tokio::spawn(async move {
            if let Err(e) = heartbeat_service::insert_heartbeat(&db, &persisted).await {
                warn!(
                    monitor_id = persisted.monitor_id,
                    error = %e,
                    "failed to persist heartbeat"
                );
            }
        });
        self.previous_beat = Some(beat);

        let cadence_secs = if verdict.status == Status::Pending && monitor.retry_interval > 0 {
            monitor.retry_interval as u64
        } else {
            interval_secs
        };
        let elapsed_ms = cycle_started.elapsed().as_millis() as u64;
        let delay = Duration::from_millis((cadence_secs * 1_000).saturating_sub(elapsed_ms));
        Ok(Some(delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(previous_status: Option<Status>, retries: i32, max_retries: i32) -> CycleInput {
        CycleInput {
            upside_down: false,
            max_retries,
            resend_interval: 0,
            is_first_beat: previous_status.is_none(),
            previous_status,
            previous_down_count: 0,
            retries,
        }
    }

    #[test]
    fn retry_ladder_pending_pending_down_down() {
        // maxRetries = 3, previous beat UP, four straight failures
        let mut previous = Some(Status::Up);
        let mut retries = 0;
        let mut observed = Vec::new();

        for _ in 0..4 {
            let verdict = settle(&input(previous, retries, 3), Status::Down);
            observed.push(verdict.status);
            previous = Some(verdict.status);
            retries = verdict.retries;
        }

        assert_eq!(
            observed,
            vec![Status::Pending, Status::Pending, Status::Down, Status::Down]
        );
        assert_eq!(retries, 0);
    }

    #[test]
    fn down_never_transitions_to_pending() {
        // even with retry budget available, a confirmed DOWN stays DOWN
        let verdict = settle(&input(Some(Status::Down), 0, 5), Status::Down);
        assert_eq!(verdict.status, Status::Down);
        assert_eq!(verdict.retries, 0);
    }

    #[test]
    fn shrinking_max_retries_mid_streak_still_avoids_pending() {
        // two pending beats accrued with budget 5, then budget drops to 1
        let verdict = settle(&input(Some(Status::Pending), 2, 1), Status::Down);
        assert_eq!(verdict.status, Status::Down);
        assert_eq!(verdict.retries, 0);
    }

    #[test]
    fn success_resets_the_retry_counter() {
        let verdict = settle(&input(Some(Status::Pending), 2, 3), Status::Up);
        assert_eq!(verdict.status, Status::Up);
        assert_eq!(verdict.retries, 0);
    }

    #[test]
    fn zero_max_retries_fails_straight_to_down() {
        let verdict = settle(&input(Some(Status::Up), 0, 0), Status::Down);
        assert_eq!(verdict.status, Status::Down);
        assert!(verdict.important);
    }

    #[test]
    fn upside_down_inverts_both_directions() {
        let mut inverted = input(Some(Status::Down), 0, 0);
        inverted.upside_down = true;

        // underlying success records DOWN
        let verdict = settle(&inverted, Status::Up);
        assert_eq!(verdict.status, Status::Down);

        // underlying failure records UP and resets retries
        let mut inverted = input(Some(Status::Down), 2, 3);
        inverted.upside_down = true;
        let verdict = settle(&inverted, Status::Down);
        assert_eq!(verdict.status, Status::Up);
        assert_eq!(verdict.retries, 0);
    }

    #[test]
    fn first_beat_is_important_whatever_the_status() {
        let verdict = settle(&input(None, 0, 0), Status::Up);
        assert!(verdict.important);
        assert_eq!(verdict.down_count, 0);
    }

    #[test]
    fn resend_counter_fires_and_resets() {
        let mut base = input(Some(Status::Down), 0, 0);
        base.resend_interval = 3;

        base.previous_down_count = 1;
        let verdict = settle(&base, Status::Down);
        assert_eq!(verdict.down_count, 2);
        assert!(!verdict.resend_due);

        base.previous_down_count = 2;
        let verdict = settle(&base, Status::Down);
        assert_eq!(verdict.down_count, 0);
        assert!(verdict.resend_due);
    }

    #[test]
    fn important_transition_resets_down_count() {
        let mut base = input(Some(Status::Down), 0, 0);
        base.resend_interval = 3;
        base.previous_down_count = 2;

        let verdict = settle(&base, Status::Up);
        assert!(verdict.important);
        assert_eq!(verdict.down_count, 0);
    }

    #[test]
    fn interval_floor_and_default() {
        assert_eq!(effective_interval_secs(60), (60, false));
        assert_eq!(effective_interval_secs(5), (20, true));
        assert_eq!(effective_interval_secs(0), (20, true));
        assert_eq!(effective_interval_secs(-3), (20, true));
        assert_eq!(
            effective_interval_secs(i32::MAX),
            (MAX_INTERVAL_SECS as u64, false)
        );
    }

    #[test]
    fn push_window_is_judged_against_the_floored_interval() {
        // a configured interval of 5 floors to 20; a beat 15 s old must
        // still be inside the window
        let (interval, floored) = effective_interval_secs(5);
        assert!(floored);
        let verdict = checks::push::evaluate(interval as i32, false, Some((Status::Up, 15_000)));
        assert!(matches!(verdict, PushVerdict::Fresh { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_a_pending_sleep() {
        let handle = Arc::new(StopHandle::new());
        let sleeper = Arc::clone(&handle);
        let task = tokio::spawn(async move { sleeper.sleep(Duration::from_secs(3600)).await });

        tokio::task::yield_now().await;
        handle.stop();
        assert!(task.await.unwrap());
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_visible() {
        let handle = StopHandle::new();
        assert!(!handle.is_stopped());
        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());
        assert!(handle.sleep(Duration::from_secs(1)).await);
    }
}
