//! Trigger - a stored definition of work with a due-condition and a blocking flag

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a trigger as recorded by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TriggerStatus {
    #[default]
    Idle,
    Running,
    Done,
    Failed,
    Paused,
}

impl std::fmt::Display for TriggerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

impl std::str::FromStr for TriggerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(Self::Idle),
            "running" => Ok(Self::Running),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            "paused" => Ok(Self::Paused),
            _ => Err(format!("Unknown trigger status: {}", s)),
        }
    }
}

/// Largest accepted interval, in seconds
///
/// Keeps `every-secs` inside the range chrono can represent as a duration.
pub const MAX_INTERVAL_SECS: u64 = i64::MAX as u64 / 1000;

/// When a trigger becomes due
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TriggerSchedule {
    /// Run once at (or after) a point in time
    Single { at: DateTime<Utc> },

    /// Run repeatedly, `every_secs` apart
    Interval {
        #[serde(rename = "every-secs")]
        every_secs: u64,
        #[serde(rename = "next-run")]
        next_run: DateTime<Utc>,
    },
}

impl TriggerSchedule {
    /// The next point in time this schedule wants to run
    pub fn next_run(&self) -> DateTime<Utc> {
        match self {
            Self::Single { at } => *at,
            Self::Interval { next_run, .. } => *next_run,
        }
    }

    /// Whether the trigger returns to idle after a successful run
    pub fn is_recurring(&self) -> bool {
        matches!(self, Self::Interval { .. })
    }

    /// Move an interval schedule forward so its next run lies after `now`
    ///
    /// Missed runs are skipped rather than replayed.
    /// Runs in constant time however far behind the schedule is. A result
    /// beyond chrono's range saturates at the latest representable time.
    pub fn advance(&mut self, now: DateTime<Utc>) {
        if let Self::Interval { every_secs, next_run } = self {
            if *next_run > now {
                return;
            }
            let every = (*every_secs).clamp(1, MAX_INTERVAL_SECS) as i64;
            let behind = (now - *next_run).num_seconds();
            let steps = behind / every + 1;
            *next_run = steps
                .checked_mul(every)
                .and_then(Duration::try_seconds)
                .and_then(|step| next_run.checked_add_signed(step))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
        }
    }

    /// Reject schedules whose interval is zero or out of range
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Interval { every_secs: 0, .. } => Err("every-secs must be greater than 0".to_string()),
            Self::Interval { every_secs, .. } if *every_secs > MAX_INTERVAL_SECS => Err(format!(
                "every-secs must be at most {} (got {})",
                MAX_INTERVAL_SECS, every_secs
            )),
            _ => Ok(()),
        }
    }
}

/// A stored trigger definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    /// Unique identifier within the store
    pub id: String,

    /// Display and log key
    #[serde(rename = "process-name")]
    pub process_name: String,

    /// Program to execute
    pub command: String,

    /// Arguments passed to the program
    #[serde(default)]
    pub args: Vec<String>,

    /// While a job of this trigger runs, no other job may launch
    #[serde(default, rename = "blocking")]
    pub is_blocking: bool,

    /// Due-condition
    pub schedule: TriggerSchedule,

    /// Status as recorded by the store
    #[serde(default)]
    pub status: TriggerStatus,

    /// When the trigger was last launched
    #[serde(default, rename = "last-run", skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,

    /// Detail of the most recent failure
    #[serde(default, rename = "last-error", skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Trigger {
    /// Create an idle trigger that runs `command` once at `at`
    pub fn single(
        id: impl Into<String>,
        process_name: impl Into<String>,
        command: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            process_name: process_name.into(),
            command: command.into(),
            args: Vec::new(),
            is_blocking: false,
            schedule: TriggerSchedule::Single { at },
            status: TriggerStatus::Idle,
            last_run: None,
            last_error: None,
        }
    }

    /// Create an idle trigger that runs `command` every `every_secs`, first at `next_run`
    pub fn interval(
        id: impl Into<String>,
        process_name: impl Into<String>,
        command: impl Into<String>,
        every_secs: u64,
        next_run: DateTime<Utc>,
    ) -> Self {
        Self {
            schedule: TriggerSchedule::Interval { every_secs, next_run },
            ..Self::single(id, process_name, command, next_run)
        }
    }

    /// Builder-style setter for the blocking flag
    pub fn blocking(mut self, is_blocking: bool) -> Self {
        self.is_blocking = is_blocking;
        self
    }

    /// Builder-style setter for the arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Idle and not scheduled in the future
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TriggerStatus::Idle && self.schedule.next_run() <= now
    }
}
