//! Scheduler configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scheduler loop configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Fixed polling cadence in seconds
    #[serde(default = "default_tick_interval_secs", rename = "tick-interval-secs")]
    pub tick_interval_secs: u64,

    /// Start the loop as soon as the daemon comes up
    #[serde(default = "default_autostart")]
    pub autostart: bool,
}

fn default_tick_interval_secs() -> u64 {
    10
}

fn default_autostart() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 10,
            autostart: true,
        }
    }
}

impl SchedulerConfig {
    /// Get the tick interval as a Duration
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}
