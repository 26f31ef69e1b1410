//! Where autopark keeps its files.
//!
//! Config, the history database and log files share one `.autopark` root.
//! The base it sits in is, in order of preference: an in-process override
//! (tests only), the `AUTOPARK_CONFIG_HOME` environment variable, or the
//! platform config directory (e.g., `%APPDATA%` on Windows).

use std::{
    path::PathBuf,
    sync::Mutex,
};

use directories::BaseDirs;
use thiserror::Error;

/// Name of the application directory created inside the base directory.
pub const APP_DIR_NAME: &str = ".autopark";
/// Environment variable that relocates the base directory.
pub const CONFIG_HOME_ENV: &str = "AUTOPARK_CONFIG_HOME";
const LOGS_DIR_NAME: &str = "logs";

static BASE_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Errors that can occur while resolving or preparing application directories.
#[derive(Debug, Error)]
pub enum AppDirError {
    /// Neither an override nor a platform config directory is available.
    #[error("No suitable base config directory available for application files")]
    NoBaseDir,
    /// Failed to create a directory.
    #[error("Failed to create application directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Which rule picked the base directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseDirSource {
    Override,
    Environment,
    Platform,
}

/// Resolve the directory the `.autopark` root lives in, without creating anything.
///
/// An empty `AUTOPARK_CONFIG_HOME` is ignored.
pub fn base_dir() -> Result<(PathBuf, BaseDirSource), AppDirError> {
    let overridden = BASE_OVERRIDE
        .lock()
        .map(|guard| guard.clone())
        .unwrap_or_else(|poisoned| poisoned.into_inner().clone());
    if let Some(path) = overridden {
        return Ok((path, BaseDirSource::Override));
    }
    if let Some(path) = std::env::var_os(CONFIG_HOME_ENV).filter(|value| !value.is_empty()) {
        return Ok((PathBuf::from(path), BaseDirSource::Environment));
    }
    BaseDirs::new()
        .map(|dirs| (dirs.config_dir().to_path_buf(), BaseDirSource::Platform))
        .ok_or(AppDirError::NoBaseDir)
}

/// Return the `.autopark` root, creating it if needed.
pub fn app_root_dir() -> Result<PathBuf, AppDirError> {
    let (base, _) = base_dir()?;
    create(base.join(APP_DIR_NAME))
}

/// Return `<root>/logs`, creating it if needed.
pub fn logs_dir() -> Result<PathBuf, AppDirError> {
    create(app_root_dir()?.join(LOGS_DIR_NAME))
}

fn create(path: PathBuf) -> Result<PathBuf, AppDirError> {
    match std::fs::create_dir_all(&path) {
        Ok(()) => Ok(path),
        Err(source) => Err(AppDirError::CreateDir { path, source }),
    }
}

/// Points the base directory at a test folder until dropped.
///
/// Holding the guard also serializes tests that depend on the override.
#[cfg(test)]
pub(crate) struct OverrideGuard {
    _serial: std::sync::MutexGuard<'static, ()>,
}

#[cfg(test)]
static OVERRIDE_SERIAL: Mutex<()> = Mutex::new(());

#[cfg(test)]
impl OverrideGuard {
    pub(crate) fn set(path: PathBuf) -> Self {
        let serial = OVERRIDE_SERIAL
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *BASE_OVERRIDE
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(path);
        Self { _serial: serial }
    }
}

#[cfg(test)]
impl Drop for OverrideGuard {
    fn drop(&mut self) {
        *BASE_OVERRIDE
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}
