//! FileTriggerStore - triggers persisted in a YAML file

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::StoreError;
use crate::domain::{Trigger, TriggerStatus};

/// On-disk layout of the triggers file
#[derive(Debug, Default, Serialize, Deserialize)]
struct TriggerFile {
    #[serde(default)]
    triggers: Vec<Trigger>,
}

/// Trigger store backed by a single YAML file
///
/// Every mutation takes an exclusive lock on a `.lock` sidecar, re-reads the
/// file, applies the change and writes the result back through a temp file
/// and rename. Readers never see a half-written file.
#[derive(Debug, Clone)]
pub struct FileTriggerStore {
    path: PathBuf,
}

impl FileTriggerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        debug!(?path, "FileTriggerStore::new: called");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the triggers file exists
    pub fn is_available(&self) -> bool {
        self.path.is_file()
    }

    /// All triggers in file order
    pub fn list(&self) -> Result<Vec<Trigger>, StoreError> {
        debug!(path = ?self.path, "FileTriggerStore::list: called");
        read_triggers(&self.path)
    }

    pub fn get(&self, id: &str) -> Result<Option<Trigger>, StoreError> {
        debug!(%id, "FileTriggerStore::get: called");
        Ok(self.list()?.into_iter().find(|t| t.id == id))
    }

    /// First due trigger in file order, without claiming it
    pub fn next_due(&self, now: DateTime<Utc>) -> Result<Option<Trigger>, StoreError> {
        debug!(%now, "FileTriggerStore::next_due: called");
        Ok(self.list()?.into_iter().find(|t| t.is_due(now)))
    }

    /// Claim the first due trigger: mark it Running and advance its schedule
    ///
    /// Returns the claimed trigger as written, or `None` when nothing is due.
    pub fn begin_next_due(&self, now: DateTime<Utc>) -> Result<Option<Trigger>, StoreError> {
        debug!(%now, "FileTriggerStore::begin_next_due: called");
        self.mutate(|triggers| {
            let Some(trigger) = triggers.iter_mut().find(|t| t.is_due(now)) else {
                return Ok(None);
            };
            trigger.status = TriggerStatus::Running;
            trigger.last_run = Some(now);
            trigger.schedule.advance(now);
            debug!(trigger_id = %trigger.id, "FileTriggerStore::begin_next_due: claimed");
            Ok(Some(trigger.clone()))
        })
    }

    /// Record a successful run
    ///
    /// One-shot triggers become Done, recurring ones go back to Idle. A
    /// trigger an operator moved out of Running meanwhile keeps its status.
    pub fn complete(&self, id: &str) -> Result<TriggerStatus, StoreError> {
        debug!(%id, "FileTriggerStore::complete: called");
        self.mutate(|triggers| {
            let trigger = find_mut(triggers, id)?;
            if trigger.status == TriggerStatus::Running {
                trigger.status = if trigger.schedule.is_recurring() {
                    TriggerStatus::Idle
                } else {
                    TriggerStatus::Done
                };
            }
            trigger.last_error = None;
            Ok(trigger.status)
        })
    }

    /// Record a failed run or launch
    pub fn fail(&self, id: &str, error: impl Into<String>) -> Result<TriggerStatus, StoreError> {
        debug!(%id, "FileTriggerStore::fail: called");
        let error = error.into();
        self.mutate(|triggers| {
            let trigger = find_mut(triggers, id)?;
            if trigger.status == TriggerStatus::Running {
                trigger.status = TriggerStatus::Failed;
            }
            trigger.last_error = Some(error);
            Ok(trigger.status)
        })
    }

    /// Force a trigger's status
    pub fn set_status(&self, id: &str, status: TriggerStatus) -> Result<Trigger, StoreError> {
        debug!(%id, %status, "FileTriggerStore::set_status: called");
        self.mutate(|triggers| {
            let trigger = find_mut(triggers, id)?;
            trigger.status = status;
            Ok(trigger.clone())
        })
    }

    /// Put a trigger back to Idle and forget its last error
    pub fn reset(&self, id: &str) -> Result<Trigger, StoreError> {
        debug!(%id, "FileTriggerStore::reset: called");
        self.mutate(|triggers| {
            let trigger = find_mut(triggers, id)?;
            trigger.status = TriggerStatus::Idle;
            trigger.last_error = None;
            Ok(trigger.clone())
        })
    }

    /// Fail every trigger left Running by a scheduler that is no longer alive
    ///
    /// Only safe to call before the scheduler starts launching.
    pub fn recover_interrupted(&self) -> Result<usize, StoreError> {
        debug!("FileTriggerStore::recover_interrupted: called");
        let recovered = self.mutate(|triggers| {
            let mut count = 0;
            for trigger in triggers.iter_mut().filter(|t| t.status == TriggerStatus::Running) {
                warn!(trigger_id = %trigger.id, "Trigger was left running by a previous scheduler");
                trigger.status = TriggerStatus::Failed;
                trigger.last_error = Some("interrupted: scheduler exited while the job was running".to_string());
                count += 1;
            }
            Ok(count)
        })?;

        if recovered > 0 {
            info!(recovered, "Recovered interrupted triggers");
        }
        Ok(recovered)
    }

    /// Add a trigger, or replace the one with the same id in place
    pub fn upsert(&self, trigger: Trigger) -> Result<(), StoreError> {
        debug!(id = %trigger.id, "FileTriggerStore::upsert: called");
        check_schedule(&trigger)?;
        self.mutate(|triggers| {
            match triggers.iter_mut().find(|t| t.id == trigger.id) {
                Some(existing) => *existing = trigger,
                None => triggers.push(trigger),
            }
            Ok(())
        })
    }

    /// Run `f` against the current triggers under the lock and persist the result
    fn mutate<T>(&self, f: impl FnOnce(&mut Vec<Trigger>) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let _lock = self.lock()?;
        let mut triggers = if self.path.exists() {
            read_triggers(&self.path)?
        } else {
            Vec::new()
        };
        let before = triggers.clone();
        let result = f(&mut triggers)?;
        if triggers != before || !self.path.exists() {
            write_triggers(&self.path, triggers)?;
        }
        Ok(result)
    }

    /// Exclusive lock held until the returned file is dropped
    fn lock(&self) -> Result<File, StoreError> {
        let lock_path = sidecar(&self.path, "lock");
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Lock {
                path: lock_path.clone(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|source| StoreError::Lock {
                path: lock_path.clone(),
                source,
            })?;
        file.lock_exclusive().map_err(|source| StoreError::Lock { path: lock_path, source })?;
        Ok(file)
    }
}

fn find_mut<'a>(triggers: &'a mut [Trigger], id: &str) -> Result<&'a mut Trigger, StoreError> {
    triggers
        .iter_mut()
        .find(|t| t.id == id)
        .ok_or_else(|| StoreError::NotFound(id.to_string()))
}

fn read_triggers(path: &Path) -> Result<Vec<Trigger>, StoreError> {
    let content = std::fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let file: TriggerFile = serde_yaml::from_str(&content).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let mut seen = std::collections::HashSet::new();
    for trigger in &file.triggers {
        if !seen.insert(trigger.id.as_str()) {
            return Err(StoreError::DuplicateId(trigger.id.clone()));
        }
        check_schedule(trigger)?;
    }
    Ok(file.triggers)
}

fn check_schedule(trigger: &Trigger) -> Result<(), StoreError> {
    trigger.schedule.validate().map_err(|reason| StoreError::InvalidSchedule {
        id: trigger.id.clone(),
        reason,
    })
}

fn write_triggers(path: &Path, triggers: Vec<Trigger>) -> Result<(), StoreError> {
    let content = serde_yaml::to_string(&TriggerFile { triggers })?;
    let tmp_path = sidecar(path, "tmp");
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = File::create(&tmp_path).map_err(write_err)?;
    tmp.write_all(content.as_bytes()).map_err(write_err)?;
    tmp.sync_all().map_err(write_err)?;
    std::fs::rename(&tmp_path, path).map_err(write_err)?;
    Ok(())
}

/// `triggers.yml` -> `triggers.yml.<suffix>`
fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
