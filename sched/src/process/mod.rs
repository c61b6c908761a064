//! Worker processes: spawning and non-blocking completion checks

mod launcher;
mod watcher;

pub use launcher::{LaunchError, ProcessLauncher, STDERR_FILE, STDOUT_FILE};
pub use watcher::{ChildWatcher, ExitOutcome, ProcessWatcher, read_tail};
