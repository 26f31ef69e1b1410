use thiserror::Error;

use crate::history::HistoryError;

/// Reasons a recorder action did not take effect.
///
/// None of these are fatal: callers log them and carry on.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// No position fix has been delivered yet.
    #[error("Location not available yet")]
    NoFixAvailable,
    /// Location permission is missing; the permission alert has been raised.
    #[error("Location permission not granted")]
    Unauthorized,
    /// No history store is attached to the recorder.
    #[error("History store is not attached")]
    StoreUnavailable,
    /// Looking up expired snapshots failed, so nothing was swept.
    #[error("Failed to query expired history: {0}")]
    StoreQueryFailure(#[source] HistoryError),
    /// A history mutation or listing failed.
    #[error("History store error: {0}")]
    Store(#[from] HistoryError),
}
