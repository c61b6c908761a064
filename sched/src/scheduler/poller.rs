//! TriggerPoller - launches at most one due trigger per tick

use std::sync::Arc;

use tracing::{debug, error, info};

use super::traits::TriggerSource;
use crate::activity::ActivityLog;
use crate::domain::Job;

/// Asks the trigger source for new work
pub struct TriggerPoller {
    source: Arc<dyn TriggerSource>,
    log: Arc<dyn ActivityLog>,
}

impl TriggerPoller {
    pub fn new(source: Arc<dyn TriggerSource>, log: Arc<dyn ActivityLog>) -> Self {
        Self { source, log }
    }

    /// Poll the source once
    ///
    /// Returns `None` when nothing was launched, including when the store
    /// query fails; the failure is logged and the loop carries on.
    pub async fn poll(&self) -> Option<Job> {
        debug!("TriggerPoller::poll: called");
        self.log.push("Checking triggers...");

        match self.source.poll_next_due_trigger().await {
            Ok(Some(job)) => {
                self.log.push(&format!("Process '{}' launched", job.process_name()));
                info!(job_id = %job.id(), trigger_id = %job.trigger().id, pid = ?job.pid(), "Job launched");
                Some(job)
            }
            Ok(None) => {
                debug!("TriggerPoller::poll: nothing due");
                None
            }
            Err(e) => {
                self.log.push(&format!("Failed to check triggers: {}", e));
                error!(error = %e, "Trigger poll failed");
                None
            }
        }
    }
}
