//! ProcessLauncher - spawns a trigger's command inside a fresh job workspace

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::watcher::{ChildWatcher, ProcessWatcher};
use crate::domain::{Job, Trigger};
use crate::workspace::{WorkspaceError, WorkspaceManager};

pub const STDOUT_FILE: &str = "stdout.log";
pub const STDERR_FILE: &str = "stderr.log";

/// Error types for launching a worker process
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("Failed to open output file {path}: {source}")]
    Output { path: PathBuf, source: io::Error },

    #[error("Failed to spawn '{command}': {source}")]
    Spawn { command: String, source: io::Error },
}

/// Spawns worker processes for triggers
///
/// Each launch gets its own workspace directory holding `stdout.log` and
/// `stderr.log`. The process runs with that directory as its cwd and sees
/// `JOBSCHED_*` variables describing the job.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    workspace: Arc<WorkspaceManager>,
    base_dir: Option<PathBuf>,
    triggers_file: Option<PathBuf>,
    stderr_tail_bytes: usize,
}

impl ProcessLauncher {
    pub fn new(workspace: Arc<WorkspaceManager>, stderr_tail_bytes: usize) -> Self {
        Self {
            workspace,
            base_dir: None,
            triggers_file: None,
            stderr_tail_bytes,
        }
    }

    /// Resolve relative command paths against the directory of `path`
    /// and expose it to workers as `JOBSCHED_TRIGGERS_FILE`
    pub fn with_triggers_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let path = std::path::absolute(&path).unwrap_or(path);
        self.base_dir = path.parent().map(Path::to_path_buf);
        self.triggers_file = Some(path);
        self
    }

    pub fn workspace(&self) -> &Arc<WorkspaceManager> {
        &self.workspace
    }

    /// Spawn the trigger's command and bind it to a new job
    pub async fn launch(&self, trigger: Arc<Trigger>) -> Result<Job, LaunchError> {
        debug!(trigger_id = %trigger.id, command = %trigger.command, "ProcessLauncher::launch: called");
        let job_id = Uuid::now_v7().to_string();
        let dir = self.workspace.create(&job_id).await?;

        match self.spawn_in(&job_id, &trigger, &dir) {
            Ok(watcher) => {
                info!(job_id = %job_id, trigger_id = %trigger.id, pid = ?watcher.pid(), "Spawned worker process");
                Ok(Job::with_id(job_id, trigger, Box::new(watcher)).with_workspace(dir))
            }
            Err(e) => {
                if let Err(cleanup) = self.workspace.remove(&job_id).await {
                    warn!(job_id = %job_id, error = %cleanup, "Failed to remove workspace of unlaunched job");
                }
                Err(e)
            }
        }
    }

    fn spawn_in(&self, job_id: &str, trigger: &Trigger, dir: &Path) -> Result<ChildWatcher, LaunchError> {
        let stdout_path = dir.join(STDOUT_FILE);
        let stderr_path = dir.join(STDERR_FILE);
        let stdout = create_output(&stdout_path)?;
        let stderr = create_output(&stderr_path)?;

        let program = self.resolve_command(&trigger.command);
        debug!(?program, args = ?trigger.args, "ProcessLauncher::spawn_in: resolved command");

        let mut cmd = Command::new(&program);
        cmd.args(&trigger.args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .env("JOBSCHED_JOB_ID", job_id)
            .env("JOBSCHED_TRIGGER_ID", &trigger.id)
            .env("JOBSCHED_PROCESS_NAME", &trigger.process_name)
            .env("JOBSCHED_WORKSPACE", dir);
        if let Some(file) = &self.triggers_file {
            cmd.env("JOBSCHED_TRIGGERS_FILE", file);
        }

        let child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            command: trigger.command.clone(),
            source,
        })?;

        Ok(ChildWatcher::new(child).with_stderr_file(stderr_path, self.stderr_tail_bytes))
    }

    /// Bare program names go through PATH; relative paths are anchored at the triggers file
    fn resolve_command(&self, command: &str) -> PathBuf {
        let path = Path::new(command);
        let is_bare_name = path.components().count() == 1;
        match &self.base_dir {
            Some(base) if path.is_relative() && !is_bare_name => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

fn create_output(path: &Path) -> Result<std::fs::File, LaunchError> {
    std::fs::File::create(path).map_err(|source| LaunchError::Output {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobState;
    use chrono::Utc;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn launcher(temp_dir: &TempDir) -> ProcessLauncher {
        let workspace = Arc::new(WorkspaceManager::new(temp_dir.path().join("workspace")));
        ProcessLauncher::new(workspace, 4096)
    }

    async fn wait_for_exit(job: &mut Job) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while job.heartbeat().unwrap().is_none() {
            assert!(Instant::now() < deadline, "job did not finish in time");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[test]
    fn test_resolve_command() {
        let temp_dir = TempDir::new().unwrap();
        let launcher = launcher(&temp_dir).with_triggers_file("/etc/jobsched/triggers.yml");

        assert_eq!(launcher.resolve_command("sh"), PathBuf::from("sh"));
        assert_eq!(launcher.resolve_command("/bin/true"), PathBuf::from("/bin/true"));
        assert_eq!(
            launcher.resolve_command("./bin/sync.sh"),
            PathBuf::from("/etc/jobsched/./bin/sync.sh")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_runs_in_workspace_with_env() {
        let temp_dir = TempDir::new().unwrap();
        let launcher = launcher(&temp_dir);
        let trigger = Arc::new(
            Trigger::single("t1", "Env check", "sh", Utc::now())
                .with_args(["-c", "echo \"$JOBSCHED_TRIGGER_ID $JOBSCHED_PROCESS_NAME\"; pwd"]),
        );

        let mut job = launcher.launch(trigger).await.unwrap();
        assert_eq!(job.state(), JobState::Launched);
        assert!(job.pid().is_some());
        wait_for_exit(&mut job).await;
        assert_eq!(job.state(), JobState::Succeeded);

        let dir = job.workspace().unwrap().to_path_buf();
        assert!(dir.starts_with(temp_dir.path().join("workspace")));
        assert!(dir.ends_with(job.id()));

        let stdout = std::fs::read_to_string(dir.join(STDOUT_FILE)).unwrap();
        let mut lines = stdout.lines();
        assert_eq!(lines.next(), Some("t1 Env check"));
        let cwd = PathBuf::from(lines.next().unwrap());
        assert_eq!(cwd.canonicalize().unwrap(), dir.canonicalize().unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_job_exposes_stderr_tail() {
        let temp_dir = TempDir::new().unwrap();
        let launcher = launcher(&temp_dir);
        let trigger = Arc::new(
            Trigger::single("t1", "Broken", "sh", Utc::now()).with_args(["-c", "echo 'no such mailbox' >&2; exit 4"]),
        );

        let mut job = launcher.launch(trigger).await.unwrap();
        wait_for_exit(&mut job).await;

        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(job.outcome().and_then(|o| o.code), Some(4));
        assert_eq!(job.failure_detail().as_deref(), Some("no such mailbox"));
    }

    #[tokio::test]
    async fn test_spawn_failure_removes_workspace() {
        let temp_dir = TempDir::new().unwrap();
        let launcher = launcher(&temp_dir);
        let trigger = Arc::new(Trigger::single("t1", "Missing", "/definitely/not/a/program", Utc::now()));

        let err = launcher.launch(trigger).await.unwrap_err();
        assert!(matches!(err, LaunchError::Spawn { .. }));
        assert!(launcher.workspace().list().await.unwrap().is_empty());
    }
}
