//! Store error types

use std::path::PathBuf;

/// Error types for trigger store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Trigger not found: {0}")]
    NotFound(String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid triggers file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("Duplicate trigger id: {0}")]
    DuplicateId(String),

    #[error("Invalid schedule for trigger {id}: {reason}")]
    InvalidSchedule { id: String, reason: String },
}
