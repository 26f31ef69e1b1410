use std::{
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use rusqlite::Connection;
use time::OffsetDateTime;

use super::{HistoryError, HistoryStore, Snapshot, SnapshotId, SortOrder};

/// Read-only history queries.
pub mod read;
/// SQLite schema for the history table.
pub mod schema;
/// Insert and delete helpers.
pub mod write;

mod util;

/// Filename used for the history database inside the app root.
pub const HISTORY_DB_FILE_NAME: &str = "history.db";

/// SQLite-backed history of recorded snapshots.
///
/// The connection sits behind a mutex so scheduler and caller threads share
/// one store while writes stay serialized.
pub struct HistoryDatabase {
    connection: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl HistoryDatabase {
    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let path = path.as_ref();
        util::create_parent_if_needed(path)?;
        let connection = Connection::open(path).map_err(util::map_sql_error)?;
        Self::from_connection(connection, Some(path.to_path_buf()))
    }

    /// Open the database named [`HISTORY_DB_FILE_NAME`] inside `dir`.
    pub fn open_in_dir(dir: impl AsRef<Path>) -> Result<Self, HistoryError> {
        Self::open(dir.as_ref().join(HISTORY_DB_FILE_NAME))
    }

    /// Open a private in-memory database, mostly useful for tests.
    pub fn open_in_memory() -> Result<Self, HistoryError> {
        let connection = Connection::open_in_memory().map_err(util::map_sql_error)?;
        Self::from_connection(connection, None)
    }

    /// Location of the database file, if it is file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn from_connection(connection: Connection, path: Option<PathBuf>) -> Result<Self, HistoryError> {
        apply_pragmas(&connection)?;
        schema::apply_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
            path,
        })
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, HistoryError> {
        self.connection.lock().map_err(|_| HistoryError::Poisoned)
    }
}

fn apply_pragmas(connection: &Connection) -> Result<(), HistoryError> {
    connection
        .execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout=5000;
             PRAGMA temp_store=MEMORY;",
        )
        .map_err(util::map_sql_error)
}

impl HistoryStore for HistoryDatabase {
    fn insert(&self, snapshot: &Snapshot) -> Result<(), HistoryError> {
        self.insert_snapshot(snapshot)
    }

    fn delete(&self, id: &SnapshotId) -> Result<bool, HistoryError> {
        self.remove_snapshot(id)
    }

    fn query_older_than(&self, cutoff: OffsetDateTime) -> Result<Vec<Snapshot>, HistoryError> {
        self.list_older_than(cutoff)
    }

    fn all(&self, order: SortOrder) -> Result<Vec<Snapshot>, HistoryError> {
        self.list_snapshots(order)
    }
}
