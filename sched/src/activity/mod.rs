//! Activity log - the human-readable progress stream of the scheduler
//!
//! Every notable scheduler event (tick start, per-job status, blocking,
//! launch and cleanup notices) is pushed as one line. The stream is
//! append-only and never feeds back into control flow.

mod file;
mod memory;

use std::sync::Arc;

pub use file::FileLog;
pub use memory::MemoryLog;

/// Append-only sink for activity lines
pub trait ActivityLog: Send + Sync {
    fn push(&self, line: &str);
}

/// Forwards activity lines to `tracing` at INFO
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl ActivityLog for TracingLog {
    fn push(&self, line: &str) {
        tracing::info!(target: "jobsched::activity", "{}", line);
    }
}

/// Prints activity lines to stdout, used when running in the foreground
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleLog;

impl ActivityLog for ConsoleLog {
    fn push(&self, line: &str) {
        println!("{}", line);
    }
}

/// Pushes every line to each inner sink, in order
#[derive(Default, Clone)]
pub struct FanoutLog {
    sinks: Vec<Arc<dyn ActivityLog>>,
}

impl FanoutLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ActivityLog>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl ActivityLog for FanoutLog {
    fn push(&self, line: &str) {
        for sink in &self.sinks {
            sink.push(line);
        }
    }
}
