//! Collaborator traits consumed by the scheduler loop

use async_trait::async_trait;

use crate::domain::Job;

/// Whether a trigger store is reachable and configured
pub trait StoreConnection: Send + Sync {
    fn is_configured(&self) -> bool;
}

/// Source of new work
#[async_trait]
pub trait TriggerSource: Send + Sync {
    /// Select the next due trigger and launch it
    ///
    /// Returns `Ok(None)` when nothing is due or nothing was launched.
    async fn poll_next_due_trigger(&self) -> eyre::Result<Option<Job>>;
}

/// Receives the terminal outcome of every job, exactly once per job
#[async_trait]
pub trait JobRecorder: Send + Sync {
    /// Process exited with code 0
    async fn record_success(&self, job: &Job) -> eyre::Result<()>;

    /// Process exited with any other code or was killed
    async fn record_failure(&self, job: &Job) -> eyre::Result<()>;
}

/// Reclaims scratch space once no jobs are active
#[async_trait]
pub trait WorkspaceCleaner: Send + Sync {
    /// Must be safe to call repeatedly when there is nothing to reclaim
    async fn reclaim_workspace(&self) -> eyre::Result<()>;
}
