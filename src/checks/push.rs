use crate::monitor::status::Status;

/// Grace added on top of the monitor interval before a push monitor is
/// considered stale, and the minimum delay before re-checking.
const PUSH_BUFFER_MS: i64 = 1_000;

/// Result of inspecting the most recent pushed heartbeat.
#[derive(Debug, PartialEq, Eq)]
pub enum PushVerdict {
    /// The endpoint pushed recently enough; check again in `next_check_ms`.
    Fresh { next_check_ms: u64 },
    /// No push arrived inside the window, treat as a failed probe.
    Stale,
}

/// Decide whether a push monitor is still alive. Push monitors never probe
/// anything themselves; the caller supplies the status of the last pushed
/// beat and how many milliseconds ago it landed.
pub fn evaluate(interval: i32, upside_down: bool, previous: Option<(Status, i64)>) -> PushVerdict {
    let expected = if upside_down { Status::Down } else { Status::Up };

    let Some((status, elapsed_ms)) = previous else {
        return PushVerdict::Stale;
    };
    if status != expected {
        return PushVerdict::Stale;
    }

    let interval_ms = i64::from(interval) * 1_000;
    if elapsed_ms > interval_ms + PUSH_BUFFER_MS {
        return PushVerdict::Stale;
    }

    let remaining = (interval_ms - elapsed_ms).max(0) + PUSH_BUFFER_MS;
    PushVerdict::Fresh {
        next_check_ms: remaining as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_beat_inside_window() {
        let verdict = evaluate(60, false, Some((Status::Up, 59_000)));
        assert_eq!(verdict, PushVerdict::Fresh { next_check_ms: 2_000 });
    }

    #[test]
    fn beat_older_than_interval_plus_buffer_is_stale() {
        assert_eq!(evaluate(60, false, Some((Status::Up, 61_500))), PushVerdict::Stale);
    }

    #[test]
    fn beat_exactly_at_buffer_edge_is_still_fresh() {
        let verdict = evaluate(60, false, Some((Status::Up, 61_000)));
        assert_eq!(verdict, PushVerdict::Fresh { next_check_ms: 1_000 });
    }

    #[test]
    fn missing_previous_beat_is_stale() {
        assert_eq!(evaluate(60, false, None), PushVerdict::Stale);
    }

    #[test]
    fn wrong_status_is_stale_even_when_recent() {
        assert_eq!(evaluate(60, false, Some((Status::Down, 1_000))), PushVerdict::Stale);
    }

    #[test]
    fn upside_down_expects_down_beats() {
        assert_eq!(
            evaluate(60, true, Some((Status::Down, 30_000))),
            PushVerdict::Fresh { next_check_ms: 31_000 }
        );
        assert_eq!(evaluate(60, true, Some((Status::Up, 30_000))), PushVerdict::Stale);
    }

    #[test]
    fn overdue_elapsed_still_yields_minimum_delay() {
        // elapsed is past the interval but inside the buffer
        let verdict = evaluate(60, false, Some((Status::Up, 60_400)));
        assert_eq!(verdict, PushVerdict::Fresh { next_check_ms: 1_000 });
    }
}
