//! Configuration models for courier.
//!
//! All I^R (resolvable ignorance) is parameterized here.
//! The operator resolves these unknowns at runtime via config file.

use super::{FrameworkId, TaskId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for courier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Update manager behaviour
    #[serde(default)]
    pub manager: ManagerConfig,

    /// Initial coordinator destination
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Checkpoint settings
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

/// Update manager configuration.
///
/// I^R resolved: the resend interval is fixed (no backoff) and configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Interval between resends of an unacknowledged update, in milliseconds
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Resend every pending head as soon as a new coordinator is detected
    #[serde(default)]
    pub flush_on_new_master: bool,
}

fn default_retry_interval_ms() -> u64 {
    10_000
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: default_retry_interval_ms(),
            flush_on_new_master: false,
        }
    }
}

impl ManagerConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// Coordinator destination.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Address used until a new coordinator is detected
    #[serde(default)]
    pub address: Option<String>,
}

/// Checkpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Whether updates are checkpointed before being applied
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Root directory holding per-task update logs
    #[serde(default = "default_meta_dir")]
    pub meta_dir: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_meta_dir() -> PathBuf {
    PathBuf::from("/var/lib/courier/meta")
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            meta_dir: default_meta_dir(),
        }
    }
}

impl CheckpointConfig {
    /// Path of the update log for a task: `<meta>/frameworks/<fw>/tasks/<task>/task.updates`.
    ///
    /// Ids are used verbatim as directory names, so an id that is empty,
    /// `.`/`..`, or contains a path separator is rejected.
    pub fn task_updates_path(
        meta_dir: &Path,
        framework_id: &FrameworkId,
        task_id: &TaskId,
    ) -> Result<PathBuf, ConfigError> {
        Ok(meta_dir
            .join("frameworks")
            .join(path_component("framework", framework_id.as_str())?)
            .join("tasks")
            .join(path_component("task", task_id.as_str())?)
            .join(TASK_UPDATES_FILE))
    }

    /// Update log path for a task under this config's meta directory,
    /// or `None` when checkpointing is disabled.
    pub fn path_for(
        &self,
        framework_id: &FrameworkId,
        task_id: &TaskId,
    ) -> Result<Option<PathBuf>, ConfigError> {
        if !self.enabled {
            return Ok(None);
        }
        Self::task_updates_path(&self.meta_dir, framework_id, task_id).map(Some)
    }
}

fn path_component<'a>(kind: &str, id: &'a str) -> Result<&'a str, ConfigError> {
    let unsafe_id = id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\', '\0']);
    if unsafe_id {
        return Err(ConfigError::Invalid(format!(
            "{kind} id '{}' cannot be used as a directory name",
            id.escape_default()
        )));
    }
    Ok(id)
}

/// File name of a task's update log.
pub const TASK_UPDATES_FILE: &str = "task.updates";

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// B_i(file exists) → Result
    /// B_i(file is valid TOML) → Result
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the manager misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.manager.retry_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "manager.retry_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
