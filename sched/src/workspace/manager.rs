//! Workspace manager for per-job working directories

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::scheduler::WorkspaceCleaner;

/// Error types for workspace operations
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("Invalid workspace name: {0}")]
    InvalidName(String),

    #[error("Failed to create workspace: {0}")]
    CreateFailed(String),

    #[error("Failed to remove workspace: {0}")]
    RemoveFailed(String),

    #[error("Failed to list workspaces: {0}")]
    ListFailed(String),
}

/// Creates, removes and reclaims job working directories under one base dir
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    base_dir: PathBuf,
}

impl WorkspaceManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        debug!(?base_dir, "WorkspaceManager::new: called");
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of a job's workspace (whether or not it exists)
    pub fn workspace_path(&self, job_id: &str) -> PathBuf {
        self.base_dir.join(job_id)
    }

    pub fn exists(&self, job_id: &str) -> bool {
        self.workspace_path(job_id).is_dir()
    }

    /// Create a fresh workspace for a job
    pub async fn create(&self, job_id: &str) -> Result<PathBuf, WorkspaceError> {
        debug!(%job_id, "WorkspaceManager::create: called");
        validate_name(job_id)?;

        let path = self.workspace_path(job_id);
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| WorkspaceError::CreateFailed(format!("{}: {}", path.display(), e)))?;

        debug!(?path, "WorkspaceManager::create: created");
        Ok(path)
    }

    /// Remove a job's workspace; a missing workspace is not an error
    pub async fn remove(&self, job_id: &str) -> Result<(), WorkspaceError> {
        debug!(%job_id, "WorkspaceManager::remove: called");
        validate_name(job_id)?;

        let path = self.workspace_path(job_id);
        if !path.exists() {
            debug!("WorkspaceManager::remove: workspace does not exist, skipping");
            return Ok(());
        }

        tokio::fs::remove_dir_all(&path)
            .await
            .map_err(|e| WorkspaceError::RemoveFailed(format!("{}: {}", path.display(), e)))?;

        debug!(?path, "WorkspaceManager::remove: removed");
        Ok(())
    }

    /// Names of all workspaces currently on disk
    pub async fn list(&self) -> Result<Vec<String>, WorkspaceError> {
        debug!("WorkspaceManager::list: called");
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&self.base_dir)
            .await
            .map_err(|e| WorkspaceError::ListFailed(e.to_string()))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WorkspaceError::ListFailed(e.to_string()))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    /// Remove everything under the base directory
    ///
    /// Returns how many entries were removed. Entries that fail to delete are
    /// logged and skipped so one stuck directory does not block the rest.
    pub async fn reclaim(&self) -> Result<usize, WorkspaceError> {
        debug!(base_dir = ?self.base_dir, "WorkspaceManager::reclaim: called");
        let mut removed = 0;

        for name in self.list().await? {
            let path = self.base_dir.join(&name);
            let result = if path.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };

            match result {
                Ok(()) => removed += 1,
                Err(e) => warn!(?path, error = %e, "Failed to reclaim workspace entry"),
            }
        }

        if removed > 0 {
            info!(removed, "Reclaimed job workspaces");
        }
        Ok(removed)
    }
}

#[async_trait]
impl WorkspaceCleaner for WorkspaceManager {
    async fn reclaim_workspace(&self) -> eyre::Result<()> {
        self.reclaim().await?;
        Ok(())
    }
}

fn validate_name(job_id: &str) -> Result<(), WorkspaceError> {
    let valid = !job_id.is_empty()
        && job_id != "."
        && job_id != ".."
        && !job_id.contains(['/', '\\']);
    if valid {
        Ok(())
    } else {
        Err(WorkspaceError::InvalidName(job_id.to_string()))
    }
}
