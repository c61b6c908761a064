//! Domain types for jobsched
//!
//! - `Trigger` - stored definition of work (due-condition, blocking flag)
//! - `Job` - a launched trigger bound to its worker process

mod job;
mod trigger;

pub use job::{Job, JobState, JobSummary};
pub use trigger::{MAX_INTERVAL_SECS, Trigger, TriggerSchedule, TriggerStatus};
