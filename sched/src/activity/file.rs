//! File-backed activity log
//!
//! Lines are appended to a plain text file with a local timestamp prefix,
//! so `jobsched logs` can show the scheduler's progress from another process.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use eyre::{Context, Result};
use tracing::{debug, warn};

use super::ActivityLog;

/// Appends timestamped lines to a file
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileLog {
    /// Open (or create) the log file for appending
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!(?path, "FileLog::open: called");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create activity log directory")?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context(format!("Failed to open activity log {}", path.display()))?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ActivityLog for FileLog {
    fn push(&self, line: &str) {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let result = writeln!(writer, "[{}] {}", stamp, line).and_then(|_| writer.flush());
        if let Err(e) = result {
            warn!(path = ?self.path, error = %e, "FileLog: failed to write activity line");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_appends_timestamped_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("activity.log");

        let log = FileLog::open(&path).unwrap();
        log.push("Running...");
        log.push("Checking triggers...");

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] Running..."));
        assert!(lines[1].ends_with("] Checking triggers..."));
    }

    #[test]
    fn test_reopen_appends() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("activity.log");

        FileLog::open(&path).unwrap().push("first");
        FileLog::open(&path).unwrap().push("second");

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
