use rusqlite::params;

use super::super::{HistoryError, Snapshot, SnapshotId};
use super::HistoryDatabase;
use super::util::{map_sql_error, timestamp_to_ns};

impl HistoryDatabase {
    /// Insert a snapshot row. Snapshots are immutable, so an id collision is an error.
    pub fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<(), HistoryError> {
        let timestamp_ns = timestamp_to_ns(snapshot.timestamp)?;
        let connection = self.lock()?;
        connection
            .prepare_cached(
                "INSERT INTO history (id, timestamp_ns, latitude, longitude, altitude, speed, accuracy)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .map_err(map_sql_error)?
            .execute(params![
                snapshot.id.to_string(),
                timestamp_ns,
                snapshot.latitude,
                snapshot.longitude,
                snapshot.altitude,
                snapshot.speed,
                snapshot.accuracy,
            ])
            .map_err(map_sql_error)?;
        Ok(())
    }

    /// Remove a snapshot row by id, returning whether a row was deleted.
    pub fn remove_snapshot(&self, id: &SnapshotId) -> Result<bool, HistoryError> {
        let connection = self.lock()?;
        let removed = connection
            .prepare_cached("DELETE FROM history WHERE id = ?1")
            .map_err(map_sql_error)?
            .execute(params![id.to_string()])
            .map_err(map_sql_error)?;
        Ok(removed > 0)
    }
}
