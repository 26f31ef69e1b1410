//! The parking recorder: turns position fixes into recorded snapshots.
//!
//! [`ParkingRecorder`] owns the stop detector, reads fixes from a
//! [`SampleSource`], writes to an attached [`HistoryStore`], and exposes the
//! manual actions a front end needs. Every failure is logged and returned;
//! none of them stop the scheduler.

use std::sync::{
    Arc, Mutex, MutexGuard, RwLock, Weak,
    atomic::{AtomicBool, Ordering},
};

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::history::{HistoryStore, Snapshot, SnapshotId, SortOrder};
use crate::location::{Coordinate, Sample, SampleSource};
use crate::travel::{Evaluation, TransitionDetector, TravelMode};

mod errors;
pub mod retention;
pub mod scheduler;

pub use errors::RecorderError;
pub use retention::{RetentionSweeper, SweepReport};
pub use scheduler::{DEFAULT_TICK_INTERVAL, EvaluationScheduler};

/// What one scheduler tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// No fix yet; nothing changed.
    NoFix,
    /// The fix was classified without triggering a recording.
    Evaluated(Evaluation),
    /// A stop was detected and the snapshot was stored.
    Recorded {
        evaluation: Evaluation,
        snapshot: Snapshot,
    },
    /// A stop was detected but the recording was refused or failed.
    Dropped {
        evaluation: Evaluation,
        error: RecorderError,
    },
}

impl TickOutcome {
    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            Self::Recorded { snapshot, .. } => Some(snapshot),
            _ => None,
        }
    }

    pub fn evaluation(&self) -> Option<&Evaluation> {
        match self {
            Self::NoFix => None,
            Self::Evaluated(evaluation)
            | Self::Recorded { evaluation, .. }
            | Self::Dropped { evaluation, .. } => Some(evaluation),
        }
    }
}

/// Automatic and manual parking-location recording.
pub struct ParkingRecorder {
    source: Arc<dyn SampleSource>,
    store: RwLock<Option<Arc<dyn HistoryStore>>>,
    detector: Mutex<TransitionDetector>,
    sweeper: RetentionSweeper,
    tick_interval: std::time::Duration,
    permission_alert: AtomicBool,
    follow_user: AtomicBool,
}

impl ParkingRecorder {
    /// Create a recorder with default thresholds, cadence and retention.
    pub fn new(source: Arc<dyn SampleSource>) -> Self {
        Self::with_parts(
            source,
            TransitionDetector::default(),
            RetentionSweeper::default(),
            DEFAULT_TICK_INTERVAL,
        )
    }

    /// Create a recorder tuned by the loaded configuration.
    pub fn from_config(source: Arc<dyn SampleSource>, config: &AppConfig) -> Self {
        Self::with_parts(
            source,
            TransitionDetector::new(config.thresholds),
            RetentionSweeper::new(config.recorder.retention_horizon()),
            config.recorder.tick_interval(),
        )
    }

    fn with_parts(
        source: Arc<dyn SampleSource>,
        detector: TransitionDetector,
        sweeper: RetentionSweeper,
        tick_interval: std::time::Duration,
    ) -> Self {
        Self {
            source,
            store: RwLock::new(None),
            detector: Mutex::new(detector),
            sweeper,
            tick_interval,
            permission_alert: AtomicBool::new(false),
            follow_user: AtomicBool::new(true),
        }
    }

    /// Builder-style variant of [`attach_store`](Self::attach_store).
    pub fn with_store(self, store: Arc<dyn HistoryStore>) -> Self {
        self.attach_store(store);
        self
    }

    /// Route recordings to `store`, replacing any previous one.
    pub fn attach_store(&self, store: Arc<dyn HistoryStore>) {
        match self.store.write() {
            Ok(mut guard) => *guard = Some(store),
            Err(poisoned) => *poisoned.into_inner() = Some(store),
        }
    }

    /// Detach and return the current store; later recordings are dropped.
    pub fn detach_store(&self) -> Option<Arc<dyn HistoryStore>> {
        match self.store.write() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        self.tick_interval
    }

    pub fn sweeper(&self) -> &RetentionSweeper {
        &self.sweeper
    }

    /// Moving mode the stop detector is currently armed with.
    pub fn last_moving_mode(&self) -> Option<TravelMode> {
        self.detector().last_moving_mode()
    }

    /// True when a refused action wants the front end to ask for location access.
    pub fn permission_alert(&self) -> bool {
        self.permission_alert.load(Ordering::Acquire)
    }

    /// Clear the permission alert once the prompt has been shown.
    pub fn acknowledge_permission_alert(&self) {
        self.permission_alert.store(false, Ordering::Release);
    }

    /// Whether the map should keep centering on the user.
    pub fn follows_user(&self) -> bool {
        self.follow_user.load(Ordering::Acquire)
    }

    pub fn set_follow_user(&self, follow: bool) {
        self.follow_user.store(follow, Ordering::Release);
    }

    /// Run one evaluation step against the latest fix.
    pub fn evaluate_tick(&self) -> TickOutcome {
        let Some(sample) = self.source.latest_sample() else {
            debug!("Evaluation skipped: no location fix yet");
            return TickOutcome::NoFix;
        };

        let evaluation = self.detector().evaluate(sample.speed);
        debug!(
            "Travel check: mode {}, speed {:.1} km/h",
            evaluation.mode, evaluation.speed_kmh
        );
        if !evaluation.stop_detected {
            return TickOutcome::Evaluated(evaluation);
        }

        if let Some(previous) = evaluation.stopped_from {
            info!("Stop detected after {previous}; recording parking location");
        }
        match self.record_sample(Some(sample)) {
            Ok(snapshot) => TickOutcome::Recorded {
                evaluation,
                snapshot,
            },
            Err(error) => TickOutcome::Dropped { evaluation, error },
        }
    }

    /// Record the latest fix right away, regardless of detector state.
    pub fn record_now(&self) -> Result<Snapshot, RecorderError> {
        self.record_sample(self.source.latest_sample())
    }

    /// Delete one snapshot by id. Returns false when it was already gone.
    pub fn delete_snapshot(&self, id: &SnapshotId) -> Result<bool, RecorderError> {
        let store = self.attached_store().inspect_err(|_| {
            warn!("History store not attached; cannot delete snapshot {id}");
        })?;
        match store.delete(id) {
            Ok(true) => {
                info!("Deleted snapshot {id}");
                Ok(true)
            }
            Ok(false) => {
                warn!("Snapshot {id} not found; nothing deleted");
                Ok(false)
            }
            Err(err) => {
                warn!("Failed to delete snapshot {id}: {err}");
                Err(err.into())
            }
        }
    }

    /// Apply the retention policy as of `now`.
    pub fn sweep_expired(&self, now: OffsetDateTime) -> Result<SweepReport, RecorderError> {
        let store = self.attached_store().inspect_err(|_| {
            warn!("History store not attached; retention sweep skipped");
        })?;
        self.sweeper
            .sweep(store.as_ref(), now)
            .inspect_err(|err| warn!("Retention sweep aborted: {err}"))
    }

    /// Full history ordered by timestamp.
    pub fn history(&self, order: SortOrder) -> Result<Vec<Snapshot>, RecorderError> {
        Ok(self.attached_store()?.all(order)?)
    }

    /// History as a viewer sees it: expired entries are swept as of `now`
    /// before listing. A failed sweep is logged and the listing still happens.
    pub fn open_history(
        &self,
        now: OffsetDateTime,
        order: SortOrder,
    ) -> Result<Vec<Snapshot>, RecorderError> {
        match self.sweep_expired(now) {
            Ok(report) if report.deleted > 0 => {
                debug!("Swept {} expired snapshots before listing", report.deleted);
            }
            Ok(_) => {}
            Err(err) => warn!("Listing history without sweeping: {err}"),
        }
        self.history(order)
    }

    /// Re-center on the user: resume following and return where they are.
    pub fn relocate(&self) -> Result<Coordinate, RecorderError> {
        self.ensure_authorized()?;
        let sample = self
            .source
            .latest_sample()
            .ok_or(RecorderError::NoFixAvailable)?;
        self.set_follow_user(true);
        Ok(sample.coordinate())
    }

    /// Start (or restart) `scheduler` ticking this recorder.
    ///
    /// The worker holds a weak reference, so dropping the last recorder
    /// handle turns later ticks into no-ops.
    pub fn start_scheduler(
        self: &Arc<Self>,
        scheduler: &mut EvaluationScheduler,
    ) -> std::io::Result<()> {
        let recorder: Weak<Self> = Arc::downgrade(self);
        scheduler.start(self.tick_interval, move || {
            if let Some(recorder) = recorder.upgrade() {
                recorder.evaluate_tick();
            }
        })
    }

    fn record_sample(&self, sample: Option<Sample>) -> Result<Snapshot, RecorderError> {
        self.ensure_authorized()?;
        let Some(sample) = sample else {
            warn!("Location not available yet; nothing recorded");
            return Err(RecorderError::NoFixAvailable);
        };
        let snapshot = Snapshot::from_sample(&sample);
        let store = self.attached_store().inspect_err(|_| {
            warn!("History store not attached; dropping snapshot");
        })?;
        store.insert(&snapshot).map_err(|err| {
            warn!("Failed to save snapshot: {err}");
            RecorderError::from(err)
        })?;
        info!(
            "Recorded snapshot {} at {} (altitude {:.1} m, speed {:.1} m/s, accuracy {:.1} m, fix time {})",
            snapshot.id,
            snapshot.coordinate(),
            snapshot.altitude,
            snapshot.speed,
            snapshot.accuracy,
            snapshot.timestamp
        );
        Ok(snapshot)
    }

    fn ensure_authorized(&self) -> Result<(), RecorderError> {
        if self.source.is_authorized() {
            return Ok(());
        }
        warn!("Location permission not granted");
        self.permission_alert.store(true, Ordering::Release);
        Err(RecorderError::Unauthorized)
    }

    fn attached_store(&self) -> Result<Arc<dyn HistoryStore>, RecorderError> {
        let guard = match self.store.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone().ok_or(RecorderError::StoreUnavailable)
    }

    fn detector(&self) -> MutexGuard<'_, TransitionDetector> {
        self.detector
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{HistoryError, MemoryHistory};
    use crate::location::{AuthorizationStatus, LatestSample, sample_at};

    struct Harness {
        cell: Arc<LatestSample>,
        store: Arc<MemoryHistory>,
        recorder: ParkingRecorder,
    }

    fn harness() -> Harness {
        let cell = Arc::new(LatestSample::with_authorization(
            AuthorizationStatus::AuthorizedAlways,
        ));
        let store = Arc::new(MemoryHistory::new());
        let recorder = ParkingRecorder::new(cell.clone()).with_store(store.clone());
        Harness {
            cell,
            store,
            recorder,
        }
    }

    impl Harness {
        fn tick_with(&self, unix_seconds: i64, speed: f64) -> TickOutcome {
            self.cell.publish(sample_at(unix_seconds, speed));
            self.recorder.evaluate_tick()
        }
    }

    #[test]
    fn no_fix_changes_nothing() {
        let h = harness();
        assert!(matches!(h.recorder.evaluate_tick(), TickOutcome::NoFix));
        assert!(h.store.is_empty());
        assert_eq!(h.recorder.last_moving_mode(), None);
    }

    #[test]
    fn driving_then_stopping_records_once() {
        let h = harness();
        assert!(h.tick_with(0, 15.0).snapshot().is_none());
        assert!(h.tick_with(30, 15.0).snapshot().is_none());
        let third = h.tick_with(60, 0.0);
        let snapshot = third.snapshot().expect("stop should record").clone();
        assert!(h.tick_with(90, 0.0).snapshot().is_none());

        assert_eq!(h.store.len(), 1);
        let stored = h.store.all(SortOrder::Ascending).unwrap();
        assert_eq!(stored[0], snapshot);
        assert_eq!(snapshot.timestamp.unix_timestamp(), 60);
        assert_eq!(snapshot.speed, 0.0);
    }

    #[test]
    fn constant_walking_pace_never_records() {
        let h = harness();
        for step in 0..20 {
            let outcome = h.tick_with(step * 30, 1.0);
            assert_eq!(
                outcome.evaluation().map(|evaluation| evaluation.mode),
                Some(TravelMode::Stationary)
            );
        }
        assert!(h.store.is_empty());
        assert_eq!(h.recorder.last_moving_mode(), None);
    }

    #[test]
    fn no_second_recording_without_rearming() {
        let h = harness();
        h.tick_with(0, 5.0);
        assert!(h.tick_with(30, 0.3).snapshot().is_some());
        for step in 2..6 {
            assert!(h.tick_with(step * 30, 0.3).snapshot().is_none());
        }
        h.tick_with(200, 12.0);
        assert!(h.tick_with(230, 0.0).snapshot().is_some());
        assert_eq!(h.store.len(), 2);
    }

    #[test]
    fn unauthorized_stop_is_dropped_and_disarms() {
        let h = harness();
        h.tick_with(0, 15.0);
        h.cell.set_authorization(AuthorizationStatus::Denied);
        let outcome = h.tick_with(30, 0.0);
        assert!(matches!(
            outcome,
            TickOutcome::Dropped {
                error: RecorderError::Unauthorized,
                ..
            }
        ));
        assert!(h.recorder.permission_alert());
        assert_eq!(h.recorder.last_moving_mode(), None);
        assert!(h.store.is_empty());
    }

    #[test]
    fn record_now_while_unauthorized_raises_alert() {
        let h = harness();
        h.cell.set_authorization(AuthorizationStatus::NotDetermined);
        h.cell.publish(sample_at(0, 0.0));
        assert!(matches!(
            h.recorder.record_now(),
            Err(RecorderError::Unauthorized)
        ));
        assert!(h.store.is_empty());
        assert!(h.recorder.permission_alert());
        h.recorder.acknowledge_permission_alert();
        assert!(!h.recorder.permission_alert());
    }

    #[test]
    fn record_now_ignores_detector_state() {
        let h = harness();
        h.cell.publish(sample_at(10, 20.0));
        let snapshot = h.recorder.record_now().unwrap();
        assert_eq!(snapshot.speed, 20.0);
        assert_eq!(h.recorder.last_moving_mode(), None);
        assert_eq!(h.store.len(), 1);
    }

    #[test]
    fn record_now_without_fix_fails() {
        let h = harness();
        assert!(matches!(
            h.recorder.record_now(),
            Err(RecorderError::NoFixAvailable)
        ));
        assert!(!h.recorder.permission_alert());
    }

    #[test]
    fn detached_store_drops_events() {
        let h = harness();
        let detached = h.recorder.detach_store();
        assert!(detached.is_some());
        h.tick_with(0, 15.0);
        let outcome = h.tick_with(30, 0.0);
        assert!(matches!(
            outcome,
            TickOutcome::Dropped {
                error: RecorderError::StoreUnavailable,
                ..
            }
        ));
        assert!(matches!(
            h.recorder.sweep_expired(OffsetDateTime::now_utc()),
            Err(RecorderError::StoreUnavailable)
        ));
        assert!(matches!(
            h.recorder.delete_snapshot(&SnapshotId::new()),
            Err(RecorderError::StoreUnavailable)
        ));
        assert!(h.store.is_empty());
    }

    #[test]
    fn opening_history_drops_expired_entries() {
        let h = harness();
        h.cell.publish(sample_at(1_000_000_000, 0.0));
        h.recorder.record_now().unwrap();
        h.cell.publish(sample_at(1_714_000_000, 0.0));
        let recent = h.recorder.record_now().unwrap();

        let now = OffsetDateTime::from_unix_timestamp(1_714_000_060).unwrap();
        let listed = h.recorder.open_history(now, SortOrder::Ascending).unwrap();
        assert_eq!(listed, vec![recent]);
        assert_eq!(h.store.len(), 1);
    }

    #[test]
    fn opening_history_survives_a_failed_sweep() {
        struct ListOnly(MemoryHistory);

        impl HistoryStore for ListOnly {
            fn insert(&self, snapshot: &Snapshot) -> Result<(), HistoryError> {
                self.0.insert(snapshot)
            }
            fn delete(&self, id: &SnapshotId) -> Result<bool, HistoryError> {
                self.0.delete(id)
            }
            fn query_older_than(&self, _cutoff: OffsetDateTime) -> Result<Vec<Snapshot>, HistoryError> {
                Err(HistoryError::Busy)
            }
            fn all(&self, order: SortOrder) -> Result<Vec<Snapshot>, HistoryError> {
                self.0.all(order)
            }
        }

        let cell = Arc::new(LatestSample::with_authorization(
            AuthorizationStatus::AuthorizedAlways,
        ));
        let recorder =
            ParkingRecorder::new(cell.clone()).with_store(Arc::new(ListOnly(MemoryHistory::new())));
        cell.publish(sample_at(0, 0.0));
        recorder.record_now().unwrap();
        let listed = recorder
            .open_history(OffsetDateTime::now_utc(), SortOrder::Ascending)
            .unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn delete_snapshot_by_id() {
        let h = harness();
        h.cell.publish(sample_at(10, 0.0));
        let snapshot = h.recorder.record_now().unwrap();
        assert!(h.recorder.delete_snapshot(&snapshot.id).unwrap());
        assert!(!h.recorder.delete_snapshot(&snapshot.id).unwrap());
        assert!(h.recorder.history(SortOrder::Ascending).unwrap().is_empty());
    }

    #[test]
    fn sweep_uses_configured_horizon() {
        let cell = Arc::new(LatestSample::with_authorization(
            AuthorizationStatus::AuthorizedWhenInUse,
        ));
        let store = Arc::new(MemoryHistory::new());
        let mut config = AppConfig::default();
        config.recorder.retention_hours = 1;
        let recorder = ParkingRecorder::from_config(cell.clone(), &config).with_store(store.clone());

        cell.publish(sample_at(0, 0.0));
        recorder.record_now().unwrap();
        cell.publish(sample_at(5_000, 0.0));
        recorder.record_now().unwrap();

        let now = OffsetDateTime::from_unix_timestamp(3_600 + 1).unwrap();
        let report = recorder.sweep_expired(now).unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn relocate_requires_permission_and_fix() {
        let h = harness();
        h.recorder.set_follow_user(false);
        assert!(matches!(
            h.recorder.relocate(),
            Err(RecorderError::NoFixAvailable)
        ));
        assert!(!h.recorder.follows_user());

        let sample = sample_at(0, 0.0);
        h.cell.publish(sample);
        assert_eq!(h.recorder.relocate().unwrap(), sample.coordinate());
        assert!(h.recorder.follows_user());

        h.cell.set_authorization(AuthorizationStatus::Restricted);
        assert!(matches!(
            h.recorder.relocate(),
            Err(RecorderError::Unauthorized)
        ));
        assert!(h.recorder.permission_alert());
    }

    struct RejectingStore;

    impl HistoryStore for RejectingStore {
        fn insert(&self, _snapshot: &Snapshot) -> Result<(), HistoryError> {
            Err(HistoryError::Busy)
        }
        fn delete(&self, _id: &SnapshotId) -> Result<bool, HistoryError> {
            Err(HistoryError::Busy)
        }
        fn query_older_than(&self, _cutoff: OffsetDateTime) -> Result<Vec<Snapshot>, HistoryError> {
            Err(HistoryError::Busy)
        }
        fn all(&self, _order: SortOrder) -> Result<Vec<Snapshot>, HistoryError> {
            Err(HistoryError::Busy)
        }
    }

    #[test]
    fn store_failures_are_reported_not_fatal() {
        let cell = Arc::new(LatestSample::with_authorization(
            AuthorizationStatus::AuthorizedAlways,
        ));
        let recorder = ParkingRecorder::new(cell.clone()).with_store(Arc::new(RejectingStore));
        cell.publish(sample_at(0, 15.0));
        recorder.evaluate_tick();
        cell.publish(sample_at(30, 0.0));
        assert!(matches!(
            recorder.evaluate_tick(),
            TickOutcome::Dropped {
                error: RecorderError::Store(HistoryError::Busy),
                ..
            }
        ));
        assert!(matches!(
            recorder.sweep_expired(OffsetDateTime::now_utc()),
            Err(RecorderError::StoreQueryFailure(HistoryError::Busy))
        ));
        assert!(matches!(
            recorder.delete_snapshot(&SnapshotId::new()),
            Err(RecorderError::Store(HistoryError::Busy))
        ));
    }

    #[test]
    fn scheduler_drives_the_recorder() {
        let cell = Arc::new(LatestSample::with_authorization(
            AuthorizationStatus::AuthorizedAlways,
        ));
        let store = Arc::new(MemoryHistory::new());
        let mut config = AppConfig::default();
        config.recorder.tick_interval_secs = 1;
        let recorder = Arc::new(
            ParkingRecorder::from_config(cell.clone(), &config).with_store(store.clone()),
        );
        assert_eq!(recorder.tick_interval(), std::time::Duration::from_secs(1));

        let mut scheduler = EvaluationScheduler::new();
        cell.publish(sample_at(0, 15.0));
        recorder.start_scheduler(&mut scheduler).unwrap();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        while recorder.last_moving_mode().is_none() && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert_eq!(recorder.last_moving_mode(), Some(TravelMode::Driving));

        cell.publish(sample_at(30, 0.0));
        while store.is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        scheduler.stop();
        assert_eq!(store.len(), 1);
    }
}
