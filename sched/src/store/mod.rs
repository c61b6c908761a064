//! Trigger persistence
//!
//! Triggers are kept in a YAML file an operator can edit by hand. The
//! scheduler claims due triggers from it and writes run results back.

mod error;
mod file;

pub use error::StoreError;
pub use file::FileTriggerStore;
