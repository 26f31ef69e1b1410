use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs;
use crate::history::HISTORY_DB_FILE_NAME;
use crate::travel::ModeThresholds;

use super::defaults::{
    clamp_retention_hours, clamp_tick_interval_secs, default_retention_hours,
    default_tick_interval_secs,
};

/// Errors that may occur while loading or saving the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to create the config directory.
    #[error("Unable to create config directory {path}: {source}")]
    CreateDir {
        /// Directory path that failed to create.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to read a config file.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to write a config file.
    #[error("Failed to write {path}: {source}")]
    Write {
        /// Path that failed to write.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to parse TOML config.
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        /// TOML file path.
        path: PathBuf,
        /// TOML parse error.
        source: toml::de::Error,
    },
    /// Failed to serialize config to TOML.
    #[error("Failed to serialize config to TOML at {path}: {source}")]
    SerializeToml {
        /// TOML file path.
        path: PathBuf,
        /// TOML serialization error.
        source: toml::ser::Error,
    },
    /// No usable config directory found.
    #[error("No suitable config directory found")]
    NoConfigDir,
}

impl From<app_dirs::AppDirError> for ConfigError {
    fn from(error: app_dirs::AppDirError) -> Self {
        match error {
            app_dirs::AppDirError::NoBaseDir => Self::NoConfigDir,
            app_dirs::AppDirError::CreateDir { path, source } => Self::CreateDir { path, source },
        }
    }
}

/// Everything persisted in `config.toml`.
///
/// Config tables: `recorder`, `thresholds`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub recorder: RecorderSettings,
    #[serde(default)]
    pub thresholds: ModeThresholds,
}

impl AppConfig {
    pub(crate) fn normalized(self) -> Self {
        Self {
            recorder: self.recorder.normalized(),
            thresholds: self.thresholds.normalized(),
        }
    }
}

/// Scheduler cadence, retention and storage location.
///
/// Config keys: `tick_interval_secs`, `retention_hours`, `database_path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecorderSettings {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
    /// Optional override for the history database file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            retention_hours: default_retention_hours(),
            database_path: None,
        }
    }
}

impl RecorderSettings {
    pub(super) fn normalized(mut self) -> Self {
        self.tick_interval_secs = clamp_tick_interval_secs(self.tick_interval_secs);
        self.retention_hours = clamp_retention_hours(self.retention_hours);
        self
    }

    /// Delay between two evaluation ticks.
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.tick_interval_secs)
    }

    /// Age past which snapshots are swept.
    pub fn retention_horizon(&self) -> time::Duration {
        let hours = i64::try_from(self.retention_hours).unwrap_or(i64::MAX);
        time::Duration::seconds(hours.saturating_mul(3600))
    }

    /// History database location: the configured override or `history.db` under `app_root`.
    pub fn database_path_in(&self, app_root: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| app_root.join(HISTORY_DB_FILE_NAME))
    }
}
