//! Logging setup for the recorder.
//!
//! One global subscriber writes human-readable lines to the console and to a
//! log file created for this launch under `<app root>/logs`. Older launch
//! files are pruned so at most [`MAX_LOG_FILES`] remain.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
    time::SystemTime,
};

use time::{
    OffsetDateTime, UtcOffset,
    format_description::BorrowedFormatItem,
    macros::format_description,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, time::OffsetTime, writer::BoxMakeWriter},
    prelude::*,
};

use crate::app_dirs::{self, AppDirError};

/// Maximum number of launch log files kept on disk.
pub const MAX_LOG_FILES: usize = 10;
const LOG_FILE_PREFIX: &str = "autopark";
const DEFAULT_FILTER: &str = "info";

const FILE_NAME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
const LINE_TIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

static FILE_WRITER_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Errors that may occur while initializing logging.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// The logs directory could not be resolved or created.
    #[error("Log directory unavailable: {0}")]
    Dir(#[from] AppDirError),
    /// A filesystem operation on the log directory failed.
    #[error("Failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    /// The launch time could not be rendered into a file name.
    #[error("Failed to format log file name: {0}")]
    FileName(#[from] time::error::Format),
    /// Another global subscriber is already installed.
    #[error("Failed to install global tracing subscriber: {0}")]
    Install(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Where console output goes.
///
/// Commands that print results on stdout log to stderr so the two don't mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleTarget {
    #[default]
    Stdout,
    Stderr,
}

impl ConsoleTarget {
    fn make_writer(self) -> BoxMakeWriter {
        match self {
            Self::Stdout => BoxMakeWriter::new(std::io::stdout),
            Self::Stderr => BoxMakeWriter::new(std::io::stderr),
        }
    }
}

/// Per-launch log files in one directory.
#[derive(Debug, Clone)]
pub struct LogFiles {
    dir: PathBuf,
    keep: usize,
}

impl LogFiles {
    pub fn new(dir: impl Into<PathBuf>, keep: usize) -> Self {
        Self {
            dir: dir.into(),
            keep,
        }
    }

    /// The `logs` folder of the app root, created if missing.
    pub fn in_app_root() -> Result<Self, LoggingError> {
        Ok(Self::new(app_dirs::logs_dir()?, MAX_LOG_FILES))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name used for a launch at `started`.
    pub fn file_name(started: OffsetDateTime) -> Result<String, LoggingError> {
        let stamp = started.format(FILE_NAME_FORMAT)?;
        Ok(format!("{LOG_FILE_PREFIX}_{stamp}.log"))
    }

    /// Create this launch's file, then drop the oldest files over the limit.
    pub fn start_launch(&self, started: OffsetDateTime) -> Result<PathBuf, LoggingError> {
        let path = self.dir.join(Self::file_name(started)?);
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| LoggingError::Io {
                action: "create log file",
                path: path.clone(),
                source,
            })?;
        self.prune()?;
        Ok(path)
    }

    /// Delete the oldest `.log` files until at most `keep` remain.
    ///
    /// Returns how many files were removed. Other files are left alone.
    pub fn prune(&self) -> Result<usize, LoggingError> {
        let mut logs: Vec<(SystemTime, PathBuf)> = fs::read_dir(&self.dir)
            .map_err(|source| LoggingError::Io {
                action: "read log directory",
                path: self.dir.clone(),
                source,
            })?
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_file()))
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "log"))
            .map(|path| {
                let modified = fs::metadata(&path)
                    .and_then(|meta| meta.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (modified, path)
            })
            .collect();
        if logs.len() <= self.keep {
            return Ok(0);
        }

        logs.sort();
        let excess = logs.len() - self.keep;
        for (_, path) in logs.drain(..excess) {
            fs::remove_file(&path).map_err(|source| LoggingError::Io {
                action: "remove old log file",
                path,
                source,
            })?;
        }
        Ok(excess)
    }
}

/// Initialize tracing with console output on stdout.
pub fn init() -> Result<(), LoggingError> {
    init_with(ConsoleTarget::Stdout)
}

/// Initialize tracing on `console` plus a log file for this launch.
///
/// Later calls are no-ops. Failures are returned so callers can keep
/// running without logs.
pub fn init_with(console: ConsoleTarget) -> Result<(), LoggingError> {
    if FILE_WRITER_GUARD.get().is_some() {
        return Ok(());
    }

    let files = LogFiles::in_app_root()?;
    let log_path = files.start_launch(launch_time())?;
    let file_name = log_path
        .file_name()
        .map(|name| name.to_owned())
        .unwrap_or_default();
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(files.dir(), file_name));

    let timer = line_timer();
    let subscriber = Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
        .with(
            fmt::layer()
                .with_timer(timer.clone())
                .with_writer(console.make_writer()),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_timer(timer)
                .with_writer(file_writer),
        );
    tracing::subscriber::set_global_default(subscriber)?;
    let _ = FILE_WRITER_GUARD.set(guard);

    tracing::info!("Logging to {}", log_path.display());
    Ok(())
}

fn line_timer() -> OffsetTime<BorrowedFormatItem<'static>> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, LINE_TIME_FORMAT.into())
}

fn launch_time() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}
