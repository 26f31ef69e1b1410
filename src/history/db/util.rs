use std::path::Path;

use time::OffsetDateTime;

use super::super::HistoryError;

/// Translate rusqlite errors into friendlier HistoryError variants.
pub(super) fn map_sql_error(err: rusqlite::Error) -> HistoryError {
    match err {
        rusqlite::Error::SqliteFailure(sql_err, _)
            if sql_err.code == rusqlite::ErrorCode::DatabaseBusy =>
        {
            HistoryError::Busy
        }
        rusqlite::Error::InvalidQuery
        | rusqlite::Error::InvalidParameterName(_)
        | rusqlite::Error::MultipleStatement => HistoryError::Unexpected,
        other => HistoryError::Sql(other),
    }
}

/// Encode a snapshot timestamp as Unix epoch nanoseconds for storage.
///
/// Only 1677-09-21 through 2262-04-11 fit in an `i64`; anything else is rejected.
pub(super) fn timestamp_to_ns(timestamp: OffsetDateTime) -> Result<i64, HistoryError> {
    i64::try_from(timestamp.unix_timestamp_nanos())
        .map_err(|_| HistoryError::TimestampOutOfRange(timestamp))
}

/// Encode a query cutoff, saturating at the storable range.
///
/// Every stored value lies inside the range, so a saturated cutoff selects
/// the same rows as the exact one would.
pub(super) fn cutoff_to_ns(cutoff: OffsetDateTime) -> i64 {
    let nanos = cutoff.unix_timestamp_nanos();
    i64::try_from(nanos).unwrap_or(if nanos < 0 { i64::MIN } else { i64::MAX })
}

/// Decode a stored epoch-nanosecond column.
pub(super) fn timestamp_from_ns(nanos: i64) -> Result<OffsetDateTime, HistoryError> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))
        .map_err(|_| HistoryError::InvalidTimestamp(nanos))
}

pub(super) fn create_parent_if_needed(path: &Path) -> Result<(), HistoryError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|source| HistoryError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}
