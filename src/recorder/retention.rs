//! Age-based eviction of recorded snapshots.

use time::{Duration, OffsetDateTime, PrimitiveDateTime};
use tracing::{info, warn};

use crate::history::HistoryStore;

use super::RecorderError;

/// Default age after which snapshots are deleted.
pub const DEFAULT_RETENTION: Duration = Duration::hours(72);

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Snapshots strictly older than this were eligible.
    pub cutoff: OffsetDateTime,
    /// Eligible snapshots found by the query.
    pub expired: usize,
    /// Snapshots actually removed.
    pub deleted: usize,
    /// Deletions that returned an error.
    pub failed: usize,
}

/// Deletes snapshots older than a fixed horizon, on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionSweeper {
    horizon: Duration,
}

impl Default for RetentionSweeper {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl RetentionSweeper {
    pub fn new(horizon: Duration) -> Self {
        Self {
            horizon: horizon.abs(),
        }
    }

    pub fn horizon(&self) -> Duration {
        self.horizon
    }

    /// Oldest timestamp that survives a sweep at `now`.
    pub fn cutoff(&self, now: OffsetDateTime) -> OffsetDateTime {
        now.checked_sub(self.horizon)
            .unwrap_or_else(|| PrimitiveDateTime::MIN.assume_utc())
    }

    /// Delete every snapshot with `timestamp < now - horizon`.
    ///
    /// A failed query aborts before anything is deleted. A failed single
    /// delete is logged and counted, and the sweep moves on.
    pub fn sweep(
        &self,
        store: &dyn HistoryStore,
        now: OffsetDateTime,
    ) -> Result<SweepReport, RecorderError> {
        let cutoff = self.cutoff(now);
        let expired = store
            .query_older_than(cutoff)
            .map_err(RecorderError::StoreQueryFailure)?;

        let mut report = SweepReport {
            cutoff,
            expired: expired.len(),
            deleted: 0,
            failed: 0,
        };
        for snapshot in &expired {
            match store.delete(&snapshot.id) {
                Ok(true) => report.deleted += 1,
                Ok(false) => {}
                Err(err) => {
                    report.failed += 1;
                    warn!("Failed to delete expired snapshot {}: {err}", snapshot.id);
                }
            }
        }
        info!(
            "Deleted {} old history items (cutoff {cutoff})",
            report.deleted
        );
        Ok(report)
    }
}
