//! Daemon process management
//!
//! PID/version files, background start by re-exec, signal delivery and the
//! status snapshot file the running daemon publishes for `jobsched status`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::scheduler::SchedulerSnapshot;

/// Current version from git describe (set at compile time)
pub const VERSION: &str = env!("GIT_DESCRIBE");

/// Directory holding the PID, version and status files
pub fn runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("jobsched")
}

/// Control requests delivered to a running daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonSignal {
    /// Stop launching; running jobs continue (SIGUSR1)
    Pause,
    /// Start launching again (SIGUSR2)
    Resume,
    /// Stop launching and exit once drained (SIGTERM)
    Shutdown,
}

impl std::fmt::Display for DaemonSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pause => write!(f, "pause"),
            Self::Resume => write!(f, "resume"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// How a stop request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Daemon drained and exited on its own
    Exited,
    /// Timed out and was killed
    Killed,
    /// Timed out; the daemon is still draining
    StillDraining,
}

/// What the running daemon publishes to its status file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub version: String,
    pub pid: u32,
    pub updated_at: DateTime<Utc>,
    pub scheduler: SchedulerSnapshot,
    /// Most recent activity lines, oldest first
    pub recent_activity: Vec<String>,
}

impl StatusReport {
    pub fn new(scheduler: SchedulerSnapshot, recent_activity: Vec<String>) -> Self {
        Self {
            version: VERSION.to_string(),
            pid: std::process::id(),
            updated_at: Utc::now(),
            scheduler,
            recent_activity,
        }
    }
}

/// Daemon process manager
#[derive(Debug, Clone)]
pub struct DaemonManager {
    pid_file: PathBuf,
    version_file: PathBuf,
    status_file: PathBuf,
}

impl Default for DaemonManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonManager {
    /// Create a daemon manager using the default runtime directory
    pub fn new() -> Self {
        Self::in_dir(runtime_dir())
    }

    /// Create a daemon manager keeping its files in `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        debug!(?dir, "DaemonManager::in_dir: called");
        Self {
            pid_file: dir.join("jobsched.pid"),
            version_file: dir.join("jobsched.version"),
            status_file: dir.join("status.json"),
        }
    }

    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    pub fn status_file(&self) -> &Path {
        &self.status_file
    }

    /// Check if a daemon is running
    pub fn is_running(&self) -> bool {
        self.running_pid().is_some()
    }

    /// Get the running daemon's PID
    pub fn running_pid(&self) -> Option<u32> {
        let result = self.read_pid().filter(|&pid| is_process_running(pid));
        debug!(?result, "DaemonManager::running_pid: returning");
        result
    }

    fn read_pid(&self) -> Option<u32> {
        fs::read_to_string(&self.pid_file).ok()?.trim().parse().ok()
    }

    fn write_pid(&self, pid: u32) -> Result<()> {
        debug!(pid, ?self.pid_file, "DaemonManager::write_pid: called");
        write_file(&self.pid_file, &pid.to_string()).context("Failed to write PID file")
    }

    /// Read the version the running daemon was built from
    pub fn read_version(&self) -> Option<String> {
        fs::read_to_string(&self.version_file)
            .ok()
            .map(|v| v.trim().to_string())
    }

    /// Check if the running daemon version matches the current CLI version
    pub fn version_matches(&self) -> bool {
        let matches = self.read_version().is_some_and(|v| v == VERSION);
        debug!(matches, cli_version = VERSION, "DaemonManager::version_matches: checked");
        matches
    }

    /// Start the daemon in the background
    ///
    /// Re-executes the current binary with `run-daemon` and returns its PID.
    pub fn start(&self, config_path: Option<&Path>) -> Result<u32> {
        debug!(?config_path, "DaemonManager::start: called");
        if let Some(pid) = self.running_pid() {
            return Err(eyre::eyre!("Daemon already running with PID {}", pid));
        }

        info!("Starting daemon...");
        let exe = std::env::current_exe().context("Failed to get current executable")?;

        let mut cmd = Command::new(&exe);
        if let Some(path) = config_path {
            let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
            cmd.arg("--config").arg(path);
        }
        let child = cmd
            .arg("run-daemon")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to spawn daemon process")?;

        let pid = child.id();
        self.write_pid(pid)?;

        info!(pid, "Daemon started");
        Ok(pid)
    }

    /// Ask the daemon to drain and exit, waiting up to `timeout`
    ///
    /// With `force`, a daemon still alive at the deadline is killed.
    pub fn stop(&self, timeout: Duration, force: bool) -> Result<StopOutcome> {
        debug!(?timeout, force, "DaemonManager::stop: called");
        let pid = self.running_pid().ok_or_else(|| eyre::eyre!("Daemon is not running"))?;

        info!(pid, "Stopping daemon...");
        self.signal(DaemonSignal::Shutdown)?;

        let deadline = Instant::now() + timeout;
        while is_process_running(pid) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(100));
        }

        if !is_process_running(pid) {
            self.cleanup()?;
            info!(pid, "Daemon stopped");
            return Ok(StopOutcome::Exited);
        }

        if !force {
            warn!(pid, "Daemon is still waiting for running jobs");
            return Ok(StopOutcome::StillDraining);
        }

        warn!(pid, "Daemon did not stop in time, sending SIGKILL");
        kill_process(pid)?;
        self.cleanup()?;
        Ok(StopOutcome::Killed)
    }

    /// Deliver a control signal to the running daemon
    pub fn signal(&self, signal: DaemonSignal) -> Result<u32> {
        debug!(%signal, "DaemonManager::signal: called");
        let pid = self.running_pid().ok_or_else(|| eyre::eyre!("Daemon is not running"))?;
        send_signal(pid, signal)?;
        debug!(pid, %signal, "DaemonManager::signal: delivered");
        Ok(pid)
    }

    /// Register the current process as the daemon
    pub fn register_self(&self) -> Result<()> {
        if let Some(pid) = self.running_pid().filter(|&pid| pid != std::process::id()) {
            return Err(eyre::eyre!("Daemon already running with PID {}", pid));
        }

        let pid = std::process::id();
        self.write_pid(pid)?;
        write_file(&self.version_file, VERSION).context("Failed to write version file")?;
        info!(pid, version = VERSION, "Daemon registered");
        Ok(())
    }

    /// Remove the PID, version and status files
    pub fn cleanup(&self) -> Result<()> {
        debug!("DaemonManager::cleanup: called");
        for path in [&self.pid_file, &self.version_file, &self.status_file] {
            if path.exists() {
                fs::remove_file(path).context(format!("Failed to remove {}", path.display()))?;
            }
        }
        Ok(())
    }

    /// Publish the daemon's status for `jobsched status`
    pub fn write_status(&self, report: &StatusReport) -> Result<()> {
        let json = serde_json::to_string_pretty(report).context("Failed to serialize status")?;
        let tmp = self.status_file.with_extension("json.tmp");
        write_file(&tmp, &json).context("Failed to write status file")?;
        fs::rename(&tmp, &self.status_file).context("Failed to replace status file")?;
        Ok(())
    }

    /// Last report published by the daemon
    pub fn read_status(&self) -> Result<Option<StatusReport>> {
        if !self.status_file.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.status_file).context("Failed to read status file")?;
        let snapshot = serde_json::from_str(&content).context("Failed to parse status file")?;
        Ok(Some(snapshot))
    }

    /// Get the daemon status
    pub fn status(&self) -> DaemonStatus {
        let pid = self.running_pid();
        DaemonStatus {
            running: pid.is_some(),
            pid,
            version: pid.and_then(|_| self.read_version()),
            pid_file: self.pid_file.clone(),
        }
    }
}

/// Daemon status information
#[derive(Debug)]
pub struct DaemonStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub version: Option<String>,
    pub pid_file: PathBuf,
}

fn write_file(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    file.write_all(contents.as_bytes())
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: DaemonSignal) -> Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let sig = match signal {
        DaemonSignal::Pause => Signal::SIGUSR1,
        DaemonSignal::Resume => Signal::SIGUSR2,
        DaemonSignal::Shutdown => Signal::SIGTERM,
    };
    kill(Pid::from_raw(pid as i32), sig).context(format!("Failed to send {}", sig))
}

#[cfg(not(unix))]
fn send_signal(_pid: u32, signal: DaemonSignal) -> Result<()> {
    Err(eyre::eyre!("Sending {} to the daemon is only supported on unix", signal))
}

#[cfg(unix)]
fn kill_process(pid: u32) -> Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), Signal::SIGKILL).context("Failed to send SIGKILL")
}

#[cfg(not(unix))]
fn kill_process(pid: u32) -> Result<()> {
    Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F"])
        .output()
        .context("Failed to kill process")?;
    Ok(())
}

/// Check if a process with the given PID is running
fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;
        // Signal 0 only checks existence
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    #[cfg(not(unix))]
    {
        Command::new("tasklist")
            .args(["/FI", &format!("PID eq {}", pid), "/NH"])
            .output()
            .map(|o| !o.stdout.is_empty() && !String::from_utf8_lossy(&o.stdout).contains("No tasks"))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{LoopPhase, LoopState, SchedulerStats};
    use tempfile::TempDir;

    #[test]
    fn test_paths_live_in_dir() {
        let temp_dir = TempDir::new().unwrap();
        let manager = DaemonManager::in_dir(temp_dir.path());
        assert_eq!(manager.pid_file(), temp_dir.path().join("jobsched.pid"));
        assert_eq!(manager.status_file(), temp_dir.path().join("status.json"));
    }

    #[test]
    fn test_is_not_running_when_no_pid_file() {
        let temp_dir = TempDir::new().unwrap();
        let manager = DaemonManager::in_dir(temp_dir.path());
        assert!(!manager.is_running());
        assert!(manager.signal(DaemonSignal::Pause).is_err());
        assert!(manager.stop(Duration::from_millis(10), false).is_err());
    }

    #[test]
    fn test_register_self_and_cleanup() {
        let temp_dir = TempDir::new().unwrap();
        let manager = DaemonManager::in_dir(temp_dir.path());

        manager.register_self().unwrap();
        assert_eq!(manager.running_pid(), Some(std::process::id()));
        assert!(manager.version_matches());

        // Registering again from the same process is allowed
        manager.register_self().unwrap();

        manager.cleanup().unwrap();
        assert!(!manager.pid_file().exists());
        assert!(manager.read_version().is_none());
    }

    #[test]
    fn test_stale_pid_file_is_not_running() {
        let temp_dir = TempDir::new().unwrap();
        let manager = DaemonManager::in_dir(temp_dir.path());
        // PIDs are capped well below this on every supported platform
        manager.write_pid(i32::MAX as u32).unwrap();

        assert!(!manager.is_running());
        assert!(!manager.status().running);
    }

    #[test]
    fn test_status_file_is_replaced_and_removed() {
        let temp_dir = TempDir::new().unwrap();
        let manager = DaemonManager::in_dir(temp_dir.path());
        assert!(manager.read_status().unwrap().is_none());

        let snapshot = SchedulerSnapshot {
            state: LoopState::Stopped,
            phase: LoopPhase::Draining,
            tick_interval_secs: 10,
            last_tick_at: None,
            jobs: Vec::new(),
            stats: SchedulerStats::default(),
        };
        manager
            .write_status(&StatusReport::new(snapshot.clone(), vec!["Running...".to_string()]))
            .unwrap();
        manager
            .write_status(&StatusReport::new(snapshot, vec!["Doing cleanup...".to_string()]))
            .unwrap();

        let report = manager.read_status().unwrap().unwrap();
        assert_eq!(report.scheduler.phase, LoopPhase::Draining);
        assert_eq!(report.recent_activity, vec!["Doing cleanup..."]);
        assert_eq!(report.pid, std::process::id());

        manager.cleanup().unwrap();
        assert!(manager.read_status().unwrap().is_none());
    }
}
