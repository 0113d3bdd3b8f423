//! Per-monitor lifecycle: the status set, the check/retry/reschedule state
//! machine and the staggered fleet startup.

pub mod runner;
pub mod scheduler;
pub mod status;
