use rusqlite::Connection;

use super::super::HistoryError;
use super::util::map_sql_error;

pub(super) fn apply_schema(connection: &Connection) -> Result<(), HistoryError> {
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS history (
                id TEXT PRIMARY KEY,
                timestamp_ns INTEGER NOT NULL,
                latitude REAL,
                longitude REAL,
                altitude REAL,
                speed REAL,
                accuracy REAL
            ) WITHOUT ROWID;
             CREATE INDEX IF NOT EXISTS idx_history_timestamp
                ON history (timestamp_ns);",
        )
        .map_err(map_sql_error)?;
    Ok(())
}
