use std::path::PathBuf;

use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::location::{Coordinate, Sample};

pub mod db;
pub mod memory;

pub use db::{HISTORY_DB_FILE_NAME, HistoryDatabase};
pub use memory::MemoryHistory;

/// Identifier for a recorded snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotId(Uuid);

impl SnapshotId {
    /// Create a new unique snapshot identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an identifier from its hyphenated string form.
    pub fn parse(text: &str) -> Result<Self, HistoryError> {
        Uuid::parse_str(text.trim())
            .map(Self)
            .map_err(|_| HistoryError::InvalidId(text.to_string()))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

/// Recorded parking location. Never modified after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub id: SnapshotId,
    /// Time of the fix the snapshot was taken from.
    pub timestamp: OffsetDateTime,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    /// Raw ground speed in m/s as reported by the fix.
    pub speed: f64,
    /// Horizontal accuracy in meters.
    pub accuracy: f64,
}

impl Snapshot {
    /// Capture a sample under a fresh identifier.
    pub fn from_sample(sample: &Sample) -> Self {
        Self {
            id: SnapshotId::new(),
            timestamp: sample.timestamp,
            latitude: sample.latitude,
            longitude: sample.longitude,
            altitude: sample.altitude,
            speed: sample.speed,
            accuracy: sample.horizontal_accuracy,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Ordering applied when listing the full history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Oldest first.
    #[default]
    Ascending,
    /// Newest first.
    Descending,
}

/// Errors returned by history stores.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// SQLite query failed.
    #[error("History query failed: {0}")]
    Sql(#[from] rusqlite::Error),
    /// Database is locked or busy.
    #[error("History database is busy, please retry")]
    Busy,
    /// SQLite returned an unexpected result.
    #[error("SQLite returned an unexpected result")]
    Unexpected,
    /// Failed to create the database's parent directory.
    #[error("Could not write to {path}: {source}")]
    CreateDir {
        /// Path that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// A stored or supplied identifier is not a UUID.
    #[error("Invalid snapshot id: {0}")]
    InvalidId(String),
    /// A stored timestamp is outside the representable range.
    #[error("Invalid snapshot timestamp: {0}")]
    InvalidTimestamp(i64),
    /// A snapshot timestamp cannot be stored without losing precision.
    #[error("Snapshot timestamp {0} is outside the storable range")]
    TimestampOutOfRange(OffsetDateTime),
    /// Another thread panicked while holding the store lock.
    #[error("History store lock poisoned")]
    Poisoned,
}

/// Storage capability the recorder writes snapshots to.
///
/// Implementations serialize their own mutations.
pub trait HistoryStore: Send + Sync {
    fn insert(&self, snapshot: &Snapshot) -> Result<(), HistoryError>;

    /// Remove a snapshot; returns false when no snapshot had that id.
    fn delete(&self, id: &SnapshotId) -> Result<bool, HistoryError>;

    /// Every snapshot with `timestamp < cutoff`, in no particular order.
    fn query_older_than(&self, cutoff: OffsetDateTime) -> Result<Vec<Snapshot>, HistoryError>;

    /// The whole history ordered by timestamp.
    fn all(&self, order: SortOrder) -> Result<Vec<Snapshot>, HistoryError>;
}
