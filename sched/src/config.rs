//! jobsched configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::scheduler::SchedulerConfig;

/// Main jobsched configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tick loop settings
    pub scheduler: SchedulerConfig,

    /// Where triggers are kept
    pub store: StoreConfig,

    /// Job working directories
    pub workspace: WorkspaceConfig,

    /// Activity log settings
    pub activity: ActivityConfig,

    /// File this configuration was loaded from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// A missing triggers file is not an error here: the daemon still comes
    /// up and reports "Not connected" until the file appears.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.tick_interval_secs == 0 {
            return Err(eyre::eyre!("scheduler.tick-interval-secs must be at least 1"));
        }
        if self.workspace.dir.as_os_str().is_empty() {
            return Err(eyre::eyre!("workspace.dir must not be empty"));
        }
        if self.activity.max_lines == 0 {
            return Err(eyre::eyre!("activity.max-lines must be at least 1"));
        }
        if let Some(file) = &self.store.triggers_file
            && file.is_dir()
        {
            return Err(eyre::eyre!("store.triggers-file {} is a directory", file.display()));
        }
        // Cleanup empties workspace.dir, so nothing jobsched keeps may live there
        if let Some(file) = &self.store.triggers_file {
            self.ensure_outside_workspace("store.triggers-file", file)?;
        }
        self.ensure_outside_workspace("activity.file", &self.activity.file_path())?;
        if let Some(file) = &self.source {
            self.ensure_outside_workspace("config file", file)?;
        }
        Ok(())
    }

    fn ensure_outside_workspace(&self, what: &str, path: &Path) -> Result<()> {
        let workspace = normalize(&self.workspace.dir);
        if normalize(path).starts_with(&workspace) {
            return Err(eyre::eyre!(
                "{} {} lies inside workspace.dir {}, which is emptied on cleanup",
                what,
                path.display(),
                workspace.display()
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    ///
    /// 1. `config_path` if given (errors are fatal)
    /// 2. `./.jobsched.yml`
    /// 3. `~/.config/jobsched/jobsched.yml`
    /// 4. defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".jobsched.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("jobsched").join("jobsched.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let mut config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.anchor_paths(path.as_ref().parent());
        config.source = Some(path.as_ref().to_path_buf());

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Relative paths in a config file are relative to that file
    fn anchor_paths(&mut self, base: Option<&Path>) {
        let Some(base) = base.filter(|b| !b.as_os_str().is_empty()) else {
            return;
        };
        let anchor = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(file) = self.store.triggers_file.as_mut() {
            anchor(file);
        }
        if let Some(file) = self.activity.file.as_mut() {
            anchor(file);
        }
        anchor(&mut self.workspace.dir);
    }
}

/// Trigger store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// YAML file holding the triggers; absent means not connected
    #[serde(rename = "triggers-file")]
    pub triggers_file: Option<PathBuf>,
}

/// Job workspace configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Base directory for per-job working directories
    pub dir: PathBuf,

    /// How much of a failed job's stderr is kept as its error
    #[serde(rename = "stderr-tail-bytes")]
    pub stderr_tail_bytes: usize,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/tmp/jobsched/workspace"),
            stderr_tail_bytes: 4096,
        }
    }
}

/// Activity log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    /// Activity log file (defaults under the user data dir)
    pub file: Option<PathBuf>,

    /// Lines kept in memory for status reporting
    #[serde(rename = "max-lines")]
    pub max_lines: usize,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            file: None,
            max_lines: 1000,
        }
    }
}

impl ActivityConfig {
    /// Configured file, or `~/.local/share/jobsched/activity.log`
    pub fn file_path(&self) -> PathBuf {
        self.file.clone().unwrap_or_else(|| data_dir().join("activity.log"))
    }
}

/// Absolute form of `path` with `.` and `..` resolved lexically
fn normalize(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Base directory for jobsched's own data files
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jobsched")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scheduler.tick_interval_secs, 10);
        assert!(config.scheduler.autostart);
        assert!(config.store.triggers_file.is_none());
        assert_eq!(config.workspace.dir, PathBuf::from("/tmp/jobsched/workspace"));
        assert_eq!(config.workspace.stderr_tail_bytes, 4096);
        assert_eq!(config.activity.max_lines, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
scheduler:
  tick-interval-secs: 5
  autostart: false
store:
  triggers-file: /srv/jobs/triggers.yml
workspace:
  dir: /var/tmp/jobs
  stderr-tail-bytes: 512
activity:
  file: /var/log/jobsched/activity.log
  max-lines: 50
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.scheduler.tick_interval_secs, 5);
        assert!(!config.scheduler.autostart);
        assert_eq!(config.store.triggers_file, Some(PathBuf::from("/srv/jobs/triggers.yml")));
        assert_eq!(config.workspace.stderr_tail_bytes, 512);
        assert_eq!(config.activity.max_lines, 50);
        assert_eq!(config.activity.file_path(), PathBuf::from("/var/log/jobsched/activity.log"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_yaml::from_str("store:\n  triggers-file: triggers.yml\n").unwrap();
        assert_eq!(config.scheduler.tick_interval_secs, 10);
        assert_eq!(config.workspace.stderr_tail_bytes, 4096);
        assert_eq!(config.store.triggers_file, Some(PathBuf::from("triggers.yml")));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.scheduler.tick_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_path_anchors_relative_paths() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("jobsched.yml");
        std::fs::write(&path, "store:\n  triggers-file: triggers.yml\nworkspace:\n  dir: /abs/ws\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.store.triggers_file, Some(temp_dir.path().join("triggers.yml")));
        assert_eq!(config.workspace.dir, PathBuf::from("/abs/ws"));
    }

    #[test]
    fn test_validate_rejects_workspace_holding_triggers_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("jobsched.yml");
        std::fs::write(&path, "store:\n  triggers-file: triggers.yml\nworkspace:\n  dir: .\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("store.triggers-file"), "{}", err);
    }

    #[test]
    fn test_validate_rejects_workspace_holding_activity_log() {
        let mut config = Config::default();
        config.workspace.dir = PathBuf::from("/srv/jobs");
        config.activity.file = Some(PathBuf::from("/srv/jobs/../jobs/logs/activity.log"));
        assert!(config.validate().is_err());

        config.activity.file = Some(PathBuf::from("/srv/jobs-logs/activity.log"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_workspace_holding_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("jobsched.yml");
        std::fs::write(&path, "workspace:\n  dir: .\nactivity:\n  file: /var/log/jobsched/activity.log\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_sibling_workspace() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("jobsched.yml");
        std::fs::write(&path, "store:\n  triggers-file: triggers.yml\nworkspace:\n  dir: workspace\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_explicit_missing_path_fails() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope.yml");
        assert!(Config::load(Some(&missing)).is_err());
    }
}
