//! Scheduler module - the tick loop that launches and tracks jobs
//!
//! Each tick sweeps running jobs for completion, checks whether a blocking
//! job is in flight, and if not launches at most one due trigger.

mod config;
mod core;
pub mod gate;
mod heartbeat;
mod jobs;
mod poller;
mod runner;
mod traits;

pub use config::SchedulerConfig;
pub use self::core::{
    Collaborators, LoopPhase, LoopState, SchedulerError, SchedulerLoop, SchedulerSnapshot, SchedulerStats,
    StartOutcome, TickOutcome,
};
pub use heartbeat::{HeartbeatChecker, HeartbeatReport};
pub use jobs::RunningJobSet;
pub use poller::TriggerPoller;
pub use runner::{SchedulerCommand, SchedulerHandle, SchedulerRunner};
pub use traits::{JobRecorder, StoreConnection, TriggerSource, WorkspaceCleaner};
