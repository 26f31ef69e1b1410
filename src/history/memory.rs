use std::sync::{Mutex, MutexGuard};

use time::OffsetDateTime;

use super::{HistoryError, HistoryStore, Snapshot, SnapshotId, SortOrder};

/// Volatile history kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    entries: Mutex<Vec<Snapshot>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Snapshot>>, HistoryError> {
        self.entries.lock().map_err(|_| HistoryError::Poisoned)
    }
}

impl HistoryStore for MemoryHistory {
    fn insert(&self, snapshot: &Snapshot) -> Result<(), HistoryError> {
        let mut entries = self.lock()?;
        if entries.iter().any(|entry| entry.id == snapshot.id) {
            return Err(HistoryError::Unexpected);
        }
        entries.push(snapshot.clone());
        Ok(())
    }

    fn delete(&self, id: &SnapshotId) -> Result<bool, HistoryError> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|entry| &entry.id != id);
        Ok(entries.len() != before)
    }

    fn query_older_than(&self, cutoff: OffsetDateTime) -> Result<Vec<Snapshot>, HistoryError> {
        Ok(self
            .lock()?
            .iter()
            .filter(|entry| entry.timestamp < cutoff)
            .cloned()
            .collect())
    }

    fn all(&self, order: SortOrder) -> Result<Vec<Snapshot>, HistoryError> {
        let mut entries = self.lock()?.clone();
        entries.sort_by_key(|entry| entry.timestamp);
        if order == SortOrder::Descending {
            entries.reverse();
        }
        Ok(entries)
    }
}
