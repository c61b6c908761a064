//! SchedulerLoop - the run/pause state machine and the per-tick sequence

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::config::SchedulerConfig;
use super::gate;
use super::heartbeat::HeartbeatChecker;
use super::jobs::RunningJobSet;
use super::poller::TriggerPoller;
use super::traits::{JobRecorder, StoreConnection, TriggerSource, WorkspaceCleaner};
use crate::activity::ActivityLog;
use crate::domain::JobSummary;

/// Stored loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Stopped,
    Running,
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
        }
    }
}

/// Loop state combined with whether jobs are still in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopPhase {
    /// Stopped with no jobs: no further ticks
    Idle,
    /// Launching new work
    Running,
    /// Stopped, but still tracking jobs until they exit
    Draining,
}

impl std::fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Draining => write!(f, "draining"),
        }
    }
}

/// What the caller should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Run another tick after this delay
    Reschedule(Duration),
    /// Stay at rest until `start` is called
    Idle,
}

/// Result of a successful `start`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The loop moved to `Running`; the first tick is due immediately
    Started,
    /// The loop was already running
    AlreadyRunning,
}

/// Errors surfaced synchronously to the caller
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("Not connected: no trigger store is configured")]
    NotConfigured,

    #[error("Scheduler is shutting down")]
    ShuttingDown,

    #[error("Scheduler channel closed")]
    ChannelClosed,
}

/// Running totals since the loop was created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub launched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cleanups: u64,
}

/// Point-in-time view of the loop for status reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    pub state: LoopState,
    pub phase: LoopPhase,
    pub tick_interval_secs: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub jobs: Vec<JobSummary>,
    pub stats: SchedulerStats,
}

impl SchedulerSnapshot {
    /// `state (phase)` in the same lowercase form the CLI prints elsewhere
    pub fn headline(&self) -> String {
        format!("{} ({})", self.state, self.phase)
    }
}

/// External collaborators the loop is wired to
#[derive(Clone)]
pub struct Collaborators {
    pub connection: Arc<dyn StoreConnection>,
    pub source: Arc<dyn TriggerSource>,
    pub recorder: Arc<dyn JobRecorder>,
    pub cleaner: Arc<dyn WorkspaceCleaner>,
    pub log: Arc<dyn ActivityLog>,
}

/// The scheduler loop
///
/// Owns the running job set exclusively. All mutation happens in `start`,
/// `stop` and `tick`, which take `&mut self`, so a tick can never overlap
/// another tick or a state change.
pub struct SchedulerLoop {
    config: SchedulerConfig,
    state: LoopState,
    jobs: RunningJobSet,
    connection: Arc<dyn StoreConnection>,
    heartbeat: HeartbeatChecker,
    poller: TriggerPoller,
    cleaner: Arc<dyn WorkspaceCleaner>,
    log: Arc<dyn ActivityLog>,
    stats: SchedulerStats,
    last_tick_at: Option<DateTime<Utc>>,
}

impl SchedulerLoop {
    pub fn new(config: SchedulerConfig, collaborators: Collaborators) -> Self {
        debug!(?config, "SchedulerLoop::new: called");
        let Collaborators {
            connection,
            source,
            recorder,
            cleaner,
            log,
        } = collaborators;

        Self {
            config,
            state: LoopState::Stopped,
            jobs: RunningJobSet::new(),
            connection,
            heartbeat: HeartbeatChecker::new(recorder, log.clone()),
            poller: TriggerPoller::new(source, log.clone()),
            cleaner,
            log,
            stats: SchedulerStats::default(),
            last_tick_at: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn phase(&self) -> LoopPhase {
        match (self.state, self.jobs.is_empty()) {
            (LoopState::Running, _) => LoopPhase::Running,
            (LoopState::Stopped, true) => LoopPhase::Idle,
            (LoopState::Stopped, false) => LoopPhase::Draining,
        }
    }

    pub fn jobs(&self) -> &RunningJobSet {
        &self.jobs
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Switch to `Running`
    ///
    /// Refuses when no trigger store is configured: a warning line is pushed
    /// and the loop stays `Stopped`.
    pub fn start(&mut self) -> Result<StartOutcome, SchedulerError> {
        debug!(state = %self.state, "SchedulerLoop::start: called");
        if !self.connection.is_configured() {
            self.log.push("Not connected");
            warn!("Refusing to start: trigger store is not configured");
            return Err(SchedulerError::NotConfigured);
        }

        if self.state == LoopState::Running {
            debug!("SchedulerLoop::start: already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        self.state = LoopState::Running;
        self.log.push("Running...");
        info!("Scheduler running");
        Ok(StartOutcome::Started)
    }

    /// Switch to `Stopped`
    ///
    /// Running jobs are neither cancelled nor signalled; ticks continue until
    /// they have all exited.
    pub fn stop(&mut self) {
        debug!(state = %self.state, "SchedulerLoop::stop: called");
        if self.state == LoopState::Stopped {
            return;
        }

        self.state = LoopState::Stopped;
        self.log
            .push("Paused... Please wait for all processes to stop before closing the application");
        info!(running_jobs = self.jobs.len(), "Scheduler paused");
    }

    /// Whether another tick has to follow the current one
    pub fn should_reschedule(&self) -> bool {
        self.state == LoopState::Running || !self.jobs.is_empty()
    }

    /// One unit of scheduler work
    pub async fn tick(&mut self) -> TickOutcome {
        debug!(state = %self.state, jobs = self.jobs.len(), "SchedulerLoop::tick: called");
        self.stats.ticks += 1;
        self.last_tick_at = Some(Utc::now());
        self.log.push(&Local::now().format("%Y-%m-%d %H:%M:%S").to_string());

        let report = self.heartbeat.check(&mut self.jobs).await;
        self.stats.succeeded += report.succeeded as u64;
        self.stats.failed += report.failed as u64;

        if self.state == LoopState::Running && !gate::is_blocked(&self.jobs, self.log.as_ref()) {
            if let Some(job) = self.poller.poll().await {
                if self.jobs.insert(job) {
                    self.stats.launched += 1;
                }
            }
        }

        if self.jobs.is_empty() {
            self.log.push("Doing cleanup...");
            if let Err(e) = self.cleaner.reclaim_workspace().await {
                self.log.push(&format!("Cleanup failed: {}", e));
                warn!(error = %e, "Workspace cleanup failed");
            }
            self.stats.cleanups += 1;
        }

        if self.should_reschedule() {
            let interval = self.config.tick_interval();
            self.log.push(&format!("Waiting {} seconds...", interval.as_secs()));
            TickOutcome::Reschedule(interval)
        } else {
            self.log.push("Scheduler is paused and no more processes are running.");
            info!("Scheduler at rest");
            TickOutcome::Idle
        }
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            state: self.state,
            phase: self.phase(),
            tick_interval_secs: self.config.tick_interval_secs,
            last_tick_at: self.last_tick_at,
            jobs: self.jobs.summaries(),
            stats: self.stats.clone(),
        }
    }
}
