//! Dispatcher - connects the scheduler loop to the trigger store and worker processes
//!
//! The scheduler only sees the collaborator traits. This type implements the
//! store-facing ones: it claims due triggers, launches them, and writes each
//! job's outcome back to the triggers file.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use eyre::{Context, eyre};
use tracing::{debug, error, warn};

use crate::activity::ActivityLog;
use crate::domain::Job;
use crate::process::ProcessLauncher;
use crate::scheduler::{JobRecorder, StoreConnection, TriggerSource};
use crate::store::{FileTriggerStore, StoreError};

pub struct Dispatcher {
    store: Option<FileTriggerStore>,
    launcher: ProcessLauncher,
    log: Arc<dyn ActivityLog>,
}

impl Dispatcher {
    /// `store` is `None` when no triggers file is configured
    pub fn new(store: Option<FileTriggerStore>, launcher: ProcessLauncher, log: Arc<dyn ActivityLog>) -> Self {
        debug!(store = ?store.as_ref().map(FileTriggerStore::path), "Dispatcher::new: called");
        Self { store, launcher, log }
    }

    pub fn store(&self) -> Option<&FileTriggerStore> {
        self.store.as_ref()
    }

    /// Run a store operation off the async runtime
    async fn with_store<T, F>(&self, f: F) -> eyre::Result<T>
    where
        F: FnOnce(&FileTriggerStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self
            .store
            .clone()
            .ok_or_else(|| eyre!("no trigger store is configured"))?;
        let result = tokio::task::spawn_blocking(move || f(&store))
            .await
            .context("Trigger store task failed")?;
        Ok(result?)
    }

    async fn release_workspace(&self, job: &Job) {
        if job.workspace().is_none() {
            return;
        }
        if let Err(e) = self.launcher.workspace().remove(job.id()).await {
            warn!(job_id = %job.id(), error = %e, "Failed to remove job workspace");
        }
    }
}

impl StoreConnection for Dispatcher {
    fn is_configured(&self) -> bool {
        self.store.as_ref().is_some_and(FileTriggerStore::is_available)
    }
}

#[async_trait]
impl TriggerSource for Dispatcher {
    async fn poll_next_due_trigger(&self) -> eyre::Result<Option<Job>> {
        debug!("Dispatcher::poll_next_due_trigger: called");
        let now = Utc::now();
        let Some(trigger) = self.with_store(move |store| store.begin_next_due(now)).await? else {
            return Ok(None);
        };
        let trigger = Arc::new(trigger);

        match self.launcher.launch(trigger.clone()).await {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                error!(trigger_id = %trigger.id, error = %e, "Failed to launch trigger");
                self.log
                    .push(&format!("Process '{}' could not be launched: {}", trigger.process_name, e));

                let id = trigger.id.clone();
                let message = e.to_string();
                self.with_store(move |store| store.fail(&id, message))
                    .await
                    .context("Failed to record launch failure")?;
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl JobRecorder for Dispatcher {
    async fn record_success(&self, job: &Job) -> eyre::Result<()> {
        debug!(job_id = %job.id(), "Dispatcher::record_success: called");
        let id = job.trigger().id.clone();
        let status = self.with_store(move |store| store.complete(&id)).await?;
        debug!(job_id = %job.id(), %status, "Dispatcher::record_success: recorded");

        self.release_workspace(job).await;
        Ok(())
    }

    async fn record_failure(&self, job: &Job) -> eyre::Result<()> {
        debug!(job_id = %job.id(), "Dispatcher::record_failure: called");
        let outcome = job
            .outcome()
            .map(|o| o.to_string())
            .unwrap_or_else(|| "unknown exit".to_string());
        let message = match job.failure_detail() {
            Some(detail) => format!("{}: {}", outcome, detail),
            None => outcome,
        };

        let id = job.trigger().id.clone();
        self.with_store(move |store| store.fail(&id, message)).await?;

        self.release_workspace(job).await;
        Ok(())
    }
}
