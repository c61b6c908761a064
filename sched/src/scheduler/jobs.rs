//! RunningJobSet - the active jobs owned by the scheduler loop

use tracing::{debug, warn};

use crate::domain::{Job, JobState, JobSummary};

/// Unordered set of running jobs
///
/// A job is in the set iff it is in state `Running`. Sweeps take the whole
/// set and hand back the survivors, so the set is never mutated while it is
/// being iterated.
#[derive(Debug, Default)]
pub struct RunningJobSet {
    jobs: Vec<Job>,
}

impl RunningJobSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// Admit a launched job, marking it `Running`
    ///
    /// Jobs that already reached a terminal state are refused.
    pub fn insert(&mut self, mut job: Job) -> bool {
        debug!(job_id = %job.id(), state = %job.state(), "RunningJobSet::insert: called");
        if job.state().is_terminal() {
            warn!(job_id = %job.id(), state = %job.state(), "Refusing to track a finished job");
            return false;
        }
        job.mark_running();
        self.jobs.push(job);
        true
    }

    /// Remove every job for a sweep
    pub(crate) fn take(&mut self) -> Vec<Job> {
        std::mem::take(&mut self.jobs)
    }

    /// Return the jobs that survived a sweep
    pub(crate) fn restore(&mut self, jobs: Vec<Job>) {
        debug_assert!(jobs.iter().all(|job| job.state() == JobState::Running));
        self.jobs.extend(jobs);
    }

    pub fn summaries(&self) -> Vec<JobSummary> {
        self.jobs.iter().map(Job::summary).collect()
    }
}
