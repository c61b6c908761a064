//! ProcessWatcher - non-blocking completion checks for worker processes

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::process::Child;
use tracing::debug;

/// How a worker process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitOutcome {
    /// Exit code, absent when the process was terminated by a signal
    pub code: Option<i32>,
}

impl ExitOutcome {
    pub fn from_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    /// Only a zero exit code counts as success
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitOutcome {
    fn from(status: std::process::ExitStatus) -> Self {
        Self { code: status.code() }
    }
}

impl std::fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {}", code),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// A handle to one job's OS process
///
/// Implementations must never block: `try_exit` is called from inside the
/// scheduler tick and has to return immediately whether or not the process
/// has finished.
pub trait ProcessWatcher: Send + Sync + std::fmt::Debug {
    /// OS process id while it is known
    fn pid(&self) -> Option<u32>;

    /// Poll for completion without waiting
    fn try_exit(&mut self) -> io::Result<Option<ExitOutcome>>;

    /// Diagnostic output for a failed run, if any was captured
    fn failure_detail(&self) -> Option<String> {
        None
    }
}

/// Watches a process spawned through `tokio::process`
#[derive(Debug)]
pub struct ChildWatcher {
    child: Child,
    stderr_path: Option<PathBuf>,
    tail_bytes: usize,
}

impl ChildWatcher {
    pub fn new(child: Child) -> Self {
        Self {
            child,
            stderr_path: None,
            tail_bytes: 0,
        }
    }

    /// Attach the file the process writes its stderr into
    pub fn with_stderr_file(mut self, path: impl Into<PathBuf>, tail_bytes: usize) -> Self {
        self.stderr_path = Some(path.into());
        self.tail_bytes = tail_bytes;
        self
    }
}

impl ProcessWatcher for ChildWatcher {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_exit(&mut self) -> io::Result<Option<ExitOutcome>> {
        let status = self.child.try_wait()?;
        debug!(?status, "ChildWatcher::try_exit: polled");
        Ok(status.map(ExitOutcome::from))
    }

    fn failure_detail(&self) -> Option<String> {
        let path = self.stderr_path.as_ref()?;
        match read_tail(path, self.tail_bytes) {
            Ok(tail) if !tail.trim().is_empty() => Some(tail.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                debug!(?path, error = %e, "ChildWatcher::failure_detail: could not read stderr file");
                None
            }
        }
    }
}

/// Read at most `max_bytes` from the end of a file
pub fn read_tail(path: &Path, max_bytes: usize) -> io::Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let start = len.saturating_sub(max_bytes as u64);
    file.seek(SeekFrom::Start(start))?;

    let mut buf = Vec::with_capacity((len - start) as usize);
    file.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;
    use tokio::process::Command;

    async fn wait_for_exit(watcher: &mut ChildWatcher) -> ExitOutcome {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(outcome) = watcher.try_exit().unwrap() {
                return outcome;
            }
            assert!(Instant::now() < deadline, "process did not exit in time");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[test]
    fn test_exit_outcome_success_only_on_zero() {
        assert!(ExitOutcome::from_code(0).success());
        assert!(!ExitOutcome::from_code(2).success());
        assert!(!ExitOutcome { code: None }.success());
    }

    #[test]
    fn test_exit_outcome_display() {
        assert_eq!(ExitOutcome::from_code(3).to_string(), "exit code 3");
        assert_eq!(ExitOutcome { code: None }.to_string(), "terminated by signal");
    }

    #[test]
    fn test_read_tail_truncates_from_front() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stderr.log");
        std::fs::write(&path, "0123456789").unwrap();

        assert_eq!(read_tail(&path, 4).unwrap(), "6789");
        assert_eq!(read_tail(&path, 100).unwrap(), "0123456789");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_try_exit_does_not_wait_for_running_process() {
        let child = Command::new("sleep").arg("5").spawn().unwrap();
        let mut watcher = ChildWatcher::new(child);

        let started = Instant::now();
        assert!(watcher.try_exit().unwrap().is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(watcher.pid().is_some());

        watcher.child.kill().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_try_exit_reports_exit_code() {
        let child = Command::new("sh").args(["-c", "exit 3"]).spawn().unwrap();
        let mut watcher = ChildWatcher::new(child);

        let outcome = wait_for_exit(&mut watcher).await;
        assert_eq!(outcome, ExitOutcome::from_code(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_detail_reads_stderr_file() {
        let temp_dir = TempDir::new().unwrap();
        let stderr_path = temp_dir.path().join("stderr.log");
        let stderr = std::fs::File::create(&stderr_path).unwrap();

        let child = Command::new("sh")
            .args(["-c", "echo 'boom: disk full' >&2; exit 1"])
            .stderr(stderr)
            .spawn()
            .unwrap();
        let mut watcher = ChildWatcher::new(child).with_stderr_file(&stderr_path, 4096);

        let outcome = wait_for_exit(&mut watcher).await;
        assert!(!outcome.success());
        assert_eq!(watcher.failure_detail().as_deref(), Some("boom: disk full"));
    }
}
