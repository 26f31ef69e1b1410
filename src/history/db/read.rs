use rusqlite::{Row, params};
use time::OffsetDateTime;

use super::super::{HistoryError, Snapshot, SnapshotId, SortOrder};
use super::HistoryDatabase;
use super::util::{cutoff_to_ns, map_sql_error, timestamp_from_ns};

const SNAPSHOT_COLUMNS: &str = "id, timestamp_ns, latitude, longitude, altitude, speed, accuracy";

/// Raw column values before id/timestamp decoding.
///
/// SQLite stores NaN as NULL, so the float columns come back optional.
struct SnapshotRow {
    id: String,
    timestamp_ns: i64,
    latitude: Option<f64>,
    longitude: Option<f64>,
    altitude: Option<f64>,
    speed: Option<f64>,
    accuracy: Option<f64>,
}

impl SnapshotRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            timestamp_ns: row.get(1)?,
            latitude: row.get(2)?,
            longitude: row.get(3)?,
            altitude: row.get(4)?,
            speed: row.get(5)?,
            accuracy: row.get(6)?,
        })
    }

    fn into_snapshot(self) -> Result<Snapshot, HistoryError> {
        Ok(Snapshot {
            id: SnapshotId::parse(&self.id)?,
            timestamp: timestamp_from_ns(self.timestamp_ns)?,
            latitude: self.latitude.unwrap_or(f64::NAN),
            longitude: self.longitude.unwrap_or(f64::NAN),
            altitude: self.altitude.unwrap_or(f64::NAN),
            speed: self.speed.unwrap_or(f64::NAN),
            accuracy: self.accuracy.unwrap_or(f64::NAN),
        })
    }
}

impl HistoryDatabase {
    /// Fetch every snapshot ordered by timestamp.
    pub fn list_snapshots(&self, order: SortOrder) -> Result<Vec<Snapshot>, HistoryError> {
        let direction = match order {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        };
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM history ORDER BY timestamp_ns {direction}, id {direction}"
        );
        let connection = self.lock()?;
        let mut stmt = connection.prepare_cached(&sql).map_err(map_sql_error)?;
        let rows = stmt
            .query_map([], SnapshotRow::from_row)
            .map_err(map_sql_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sql_error)?;
        rows.into_iter().map(SnapshotRow::into_snapshot).collect()
    }

    /// Fetch snapshots strictly older than `cutoff`.
    pub fn list_older_than(&self, cutoff: OffsetDateTime) -> Result<Vec<Snapshot>, HistoryError> {
        let connection = self.lock()?;
        let mut stmt = connection
            .prepare_cached(&format!(
                "SELECT {SNAPSHOT_COLUMNS} FROM history WHERE timestamp_ns < ?1"
            ))
            .map_err(map_sql_error)?;
        let rows = stmt
            .query_map(params![cutoff_to_ns(cutoff)], SnapshotRow::from_row)
            .map_err(map_sql_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sql_error)?;
        rows.into_iter().map(SnapshotRow::into_snapshot).collect()
    }

    /// Count stored snapshots.
    pub fn count_snapshots(&self) -> Result<usize, HistoryError> {
        let connection = self.lock()?;
        let count: i64 = connection
            .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))
            .map_err(map_sql_error)?;
        usize::try_from(count).map_err(|_| HistoryError::Unexpected)
    }
}
