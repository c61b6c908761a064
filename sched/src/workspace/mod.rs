//! Job workspace management
//!
//! Every launched job gets its own directory under the workspace base dir.
//! The directory holds the job's captured stdout/stderr and whatever the
//! worker writes; the scheduler reclaims all of it once no jobs are active.

mod manager;

pub use manager::{WorkspaceError, WorkspaceManager};
