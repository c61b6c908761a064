//! Job - a live binding between a trigger and its spawned process

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::trigger::Trigger;
use crate::process::{ExitOutcome, ProcessWatcher};

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Launched,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Launched => write!(f, "launched"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A launched trigger and the process executing it
#[derive(Debug)]
pub struct Job {
    id: String,
    trigger: Arc<Trigger>,
    process: Box<dyn ProcessWatcher>,
    state: JobState,
    launched_at: DateTime<Utc>,
    workspace: Option<PathBuf>,
    outcome: Option<ExitOutcome>,
}

impl Job {
    /// Bind a freshly spawned process to the trigger it runs
    pub fn new(trigger: Arc<Trigger>, process: Box<dyn ProcessWatcher>) -> Self {
        Self::with_id(Uuid::now_v7().to_string(), trigger, process)
    }

    pub fn with_id(id: impl Into<String>, trigger: Arc<Trigger>, process: Box<dyn ProcessWatcher>) -> Self {
        Self {
            id: id.into(),
            trigger,
            process,
            state: JobState::Launched,
            launched_at: Utc::now(),
            workspace: None,
            outcome: None,
        }
    }

    /// Record the working directory provisioned for this job
    pub fn with_workspace(mut self, path: impl Into<PathBuf>) -> Self {
        self.workspace = Some(path.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn trigger(&self) -> &Arc<Trigger> {
        &self.trigger
    }

    pub fn process_name(&self) -> &str {
        &self.trigger.process_name
    }

    pub fn is_blocking(&self) -> bool {
        self.trigger.is_blocking
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn launched_at(&self) -> DateTime<Utc> {
        self.launched_at
    }

    pub fn workspace(&self) -> Option<&Path> {
        self.workspace.as_deref()
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    /// Exit outcome once the job has left `Running`
    pub fn outcome(&self) -> Option<ExitOutcome> {
        self.outcome
    }

    /// Captured diagnostics for a failed run
    pub fn failure_detail(&self) -> Option<String> {
        self.process.failure_detail()
    }

    /// Admit the job into the active set
    pub(crate) fn mark_running(&mut self) {
        if self.state == JobState::Launched {
            self.state = JobState::Running;
        }
    }

    /// Poll the process once; leaves `Running` when it has finished
    ///
    /// A terminal job keeps reporting the outcome it already observed and
    /// never polls its process again.
    pub fn heartbeat(&mut self) -> io::Result<Option<ExitOutcome>> {
        if self.state.is_terminal() {
            return Ok(self.outcome);
        }

        let Some(outcome) = self.process.try_exit()? else {
            return Ok(None);
        };

        self.state = if outcome.success() {
            JobState::Succeeded
        } else {
            JobState::Failed
        };
        self.outcome = Some(outcome);
        Ok(Some(outcome))
    }

    /// Serializable view for status reporting
    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id.clone(),
            trigger_id: self.trigger.id.clone(),
            process_name: self.trigger.process_name.clone(),
            blocking: self.trigger.is_blocking,
            pid: self.pid(),
            launched_at: self.launched_at,
        }
    }
}

/// Snapshot of an active job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: String,
    pub trigger_id: String,
    pub process_name: String,
    pub blocking: bool,
    pub pid: Option<u32>,
    pub launched_at: DateTime<Utc>,
}
