//! BlockingGate - suppresses launches while a blocking job is in flight

use tracing::debug;

use super::jobs::RunningJobSet;
use crate::activity::ActivityLog;

/// Whether any running job belongs to a blocking trigger
pub fn any_blocking(jobs: &RunningJobSet) -> bool {
    jobs.iter().any(|job| job.is_blocking())
}

/// Gate check for the current tick, with one log line per blocking job
///
/// Recomputed on every call; the heartbeat sweep earlier in the same tick may
/// have removed the job that was blocking.
pub fn is_blocked(jobs: &RunningJobSet, log: &dyn ActivityLog) -> bool {
    let mut blocked = false;
    for job in jobs.iter().filter(|job| job.is_blocking()) {
        log.push(&format!("Process '{}' is blocking", job.process_name()));
        blocked = true;
    }
    debug!(blocked, "is_blocked: evaluated");
    blocked
}
