//! jobsched - recurring job scheduler
//!
//! jobsched polls a trigger store on a fixed interval, launches the command
//! of each due trigger as an independent OS process, watches those processes
//! without blocking, and writes every job's outcome back to the store.
//!
//! # Core Concepts
//!
//! - **One tick at a time**: a single task owns the loop; ticks never overlap
//! - **Blocking triggers**: while a blocking job runs, nothing else launches
//! - **Graceful pause**: stopping only stops launches; running jobs drain
//! - **Exactly-once outcomes**: each finished job is recorded once, then dropped
//!
//! # Modules
//!
//! - [`scheduler`] - Tick loop, heartbeat sweep, blocking gate and runner actor
//! - [`domain`] - Trigger and job types
//! - [`process`] - Spawning workers and polling them for exit
//! - [`store`] - YAML-file trigger store
//! - [`dispatch`] - Store-backed trigger source and job recorder
//! - [`workspace`] - Per-job working directories
//! - [`activity`] - Human-readable activity log sinks
//! - [`daemon`] - PID files, signals and status file
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod activity;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod domain;
pub mod process;
pub mod scheduler;
pub mod store;
pub mod workspace;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use activity::{ActivityLog, FanoutLog, FileLog, MemoryLog, TracingLog};
pub use config::Config;
pub use dispatch::Dispatcher;
pub use domain::{Job, JobState, JobSummary, Trigger, TriggerSchedule, TriggerStatus};
pub use process::{ChildWatcher, ExitOutcome, LaunchError, ProcessLauncher, ProcessWatcher};
pub use scheduler::{
    Collaborators, JobRecorder, LoopPhase, LoopState, SchedulerConfig, SchedulerError, SchedulerHandle, SchedulerLoop,
    SchedulerRunner, SchedulerSnapshot, StoreConnection, TickOutcome, TriggerSource, WorkspaceCleaner,
};
pub use store::{FileTriggerStore, StoreError};
pub use workspace::{WorkspaceError, WorkspaceManager};
