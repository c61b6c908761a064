//! HeartbeatChecker - reclaims finished jobs and reports their outcome

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::jobs::RunningJobSet;
use super::traits::JobRecorder;
use crate::activity::ActivityLog;
use crate::domain::Job;
use crate::process::ExitOutcome;

/// Counts from one sweep over the running jobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub still_running: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Jobs whose status could not be queried this sweep; they stay tracked
    pub check_errors: usize,
}

/// Sweeps the running jobs once per tick
pub struct HeartbeatChecker {
    recorder: Arc<dyn JobRecorder>,
    log: Arc<dyn ActivityLog>,
}

impl HeartbeatChecker {
    pub fn new(recorder: Arc<dyn JobRecorder>, log: Arc<dyn ActivityLog>) -> Self {
        Self { recorder, log }
    }

    /// Poll every job without waiting on any of them
    ///
    /// Finished jobs leave the set and get exactly one recorder call. A job
    /// whose status query errors is kept for the next sweep; the other jobs
    /// are still checked.
    pub async fn check(&self, jobs: &mut RunningJobSet) -> HeartbeatReport {
        debug!(count = jobs.len(), "HeartbeatChecker::check: called");
        self.log.push("Checking heartbeats...");

        let mut report = HeartbeatReport::default();
        let mut survivors = Vec::with_capacity(jobs.len());

        for mut job in jobs.take() {
            match job.heartbeat() {
                Ok(None) => {
                    self.log
                        .push(&format!("Process '{}' is still running", job.process_name()));
                    report.still_running += 1;
                    survivors.push(job);
                }
                Ok(Some(outcome)) if outcome.success() => {
                    self.log.push(&format!("Process '{}' is done", job.process_name()));
                    info!(job_id = %job.id(), trigger_id = %job.trigger().id, "Job succeeded");
                    report.succeeded += 1;
                    self.record_success(&job).await;
                }
                Ok(Some(outcome)) => {
                    self.log
                        .push(&format!("Process '{}' failed ({})", job.process_name(), outcome));
                    report.failed += 1;
                    self.record_failure(&job, outcome).await;
                }
                Err(e) => {
                    self.log.push(&format!(
                        "Could not check process '{}': {}",
                        job.process_name(),
                        e
                    ));
                    warn!(job_id = %job.id(), error = %e, "Job status query failed, keeping job");
                    report.check_errors += 1;
                    survivors.push(job);
                }
            }
        }

        jobs.restore(survivors);
        debug!(?report, "HeartbeatChecker::check: done");
        report
    }

    async fn record_success(&self, job: &Job) {
        if let Err(e) = self.recorder.record_success(job).await {
            self.log.push(&format!(
                "Failed to record success of '{}': {}",
                job.process_name(),
                e
            ));
            error!(job_id = %job.id(), error = %e, "Failed to record job success");
        }
    }

    async fn record_failure(&self, job: &Job, outcome: ExitOutcome) {
        error!(job_id = %job.id(), trigger_id = %job.trigger().id, %outcome, "Job failed");
        if let Some(detail) = job.failure_detail() {
            self.log
                .push(&format!("Process '{}' error output:\n{}", job.process_name(), detail));
        }
        if let Err(e) = self.recorder.record_failure(job).await {
            self.log.push(&format!(
                "Failed to record failure of '{}': {}",
                job.process_name(),
                e
            ));
            error!(job_id = %job.id(), error = %e, "Failed to record job failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::MemoryLog;
    use crate::testing::{Recorded, RecordingRecorder, running_job};
    use std::time::{Duration, Instant};

    fn checker() -> (HeartbeatChecker, Arc<RecordingRecorder>, Arc<MemoryLog>) {
        let recorder = Arc::new(RecordingRecorder::default());
        let log = Arc::new(MemoryLog::default());
        (HeartbeatChecker::new(recorder.clone(), log.clone()), recorder, log)
    }

    #[tokio::test]
    async fn test_pending_job_is_left_untouched() {
        let (checker, recorder, log) = checker();
        let mut jobs = RunningJobSet::new();
        let (job, _exit) = running_job("sync", false);
        jobs.insert(job);

        let started = Instant::now();
        let report = checker.check(&mut jobs).await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(report.still_running, 1);
        assert_eq!(jobs.len(), 1);
        assert!(recorder.calls().is_empty());
        assert!(log.contains("Process 'sync' is still running"));
    }

    #[tokio::test]
    async fn test_classifies_success_and_failure() {
        let (checker, recorder, log) = checker();
        let mut jobs = RunningJobSet::new();
        let (ok, ok_exit) = running_job("ok", false);
        let (bad, bad_exit) = running_job("bad", false);
        jobs.insert(ok);
        jobs.insert(bad);

        ok_exit.finish(0);
        bad_exit.finish(2);
        let report = checker.check(&mut jobs).await;

        assert!(jobs.is_empty());
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        let calls = recorder.calls();
        assert!(calls.contains(&Recorded::Success("job-ok".to_string())));
        assert!(calls.contains(&Recorded::Failure("job-bad".to_string())));
        assert!(log.contains("Process 'ok' is done"));
        assert!(log.contains("Process 'bad' failed (exit code 2)"));
    }

    #[tokio::test]
    async fn test_records_exactly_once() {
        let (checker, recorder, _log) = checker();
        let mut jobs = RunningJobSet::new();
        let (job, exit) = running_job("once", false);
        jobs.insert(job);

        checker.check(&mut jobs).await;
        exit.finish(1);
        checker.check(&mut jobs).await;
        checker.check(&mut jobs).await;

        assert_eq!(recorder.calls(), vec![Recorded::Failure("job-once".to_string())]);
    }

    #[tokio::test]
    async fn test_status_error_does_not_abort_sweep() {
        let (checker, recorder, log) = checker();
        let mut jobs = RunningJobSet::new();
        let (broken, broken_exit) = running_job("broken", false);
        let (fine, fine_exit) = running_job("fine", false);
        jobs.insert(broken);
        jobs.insert(fine);

        broken_exit.fail_polls(true);
        fine_exit.finish(0);
        let report = checker.check(&mut jobs).await;

        assert_eq!(report.check_errors, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(jobs.len(), 1);
        assert_eq!(recorder.calls(), vec![Recorded::Success("job-fine".to_string())]);
        assert!(log.contains("Could not check process 'broken'"));

        broken_exit.fail_polls(false);
        broken_exit.finish(0);
        checker.check(&mut jobs).await;
        assert!(jobs.is_empty());
    }

    #[tokio::test]
    async fn test_recorder_error_still_removes_job() {
        let (checker, recorder, log) = checker();
        recorder.fail_with_error(true);
        let mut jobs = RunningJobSet::new();
        let (job, exit) = running_job("flaky", false);
        jobs.insert(job);

        exit.finish(0);
        checker.check(&mut jobs).await;

        assert!(jobs.is_empty());
        assert_eq!(recorder.calls().len(), 1);
        assert!(log.contains("Failed to record success of 'flaky'"));
    }

    #[tokio::test]
    async fn test_failure_detail_is_logged() {
        let (checker, _recorder, log) = checker();
        let mut jobs = RunningJobSet::new();
        let (job, exit) = running_job("report", false);
        jobs.insert(job);

        exit.set_detail("Traceback: KeyError 'invoice'");
        exit.finish(1);
        checker.check(&mut jobs).await;

        assert!(log.contains("KeyError 'invoice'"));
    }
}
