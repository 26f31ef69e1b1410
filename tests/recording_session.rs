mod support;

use support::autopark_env::AutoparkEnvGuard;

use autopark::{
    app_dirs,
    config::{self, AppConfig},
    history::{HISTORY_DB_FILE_NAME, HistoryDatabase, SortOrder},
    location::{AuthorizationStatus, LatestSample, Sample},
    recorder::{EvaluationScheduler, ParkingRecorder, RecorderError, TickOutcome},
    travel::TravelMode,
};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tempfile::TempDir;
use time::OffsetDateTime;

const START: i64 = 1_714_000_000;

struct SessionHarness {
    _env: AutoparkEnvGuard,
    _temp: TempDir,
    cell: Arc<LatestSample>,
    recorder: Arc<ParkingRecorder>,
    config: AppConfig,
}

impl SessionHarness {
    fn new(config: AppConfig) -> Self {
        let temp = tempfile::tempdir().expect("create tempdir");
        let config_home = temp.path().join("config");
        std::fs::create_dir_all(&config_home).expect("create config dir");
        let env = AutoparkEnvGuard::set_config_home(config_home);

        config::save(&config).expect("save config");
        let config = config::load_or_default().expect("load config");
        let (cell, recorder) = Self::open_recorder(&config, AuthorizationStatus::AuthorizedAlways);
        Self {
            _env: env,
            _temp: temp,
            cell,
            recorder,
            config,
        }
    }

    fn open_recorder(
        config: &AppConfig,
        status: AuthorizationStatus,
    ) -> (Arc<LatestSample>, Arc<ParkingRecorder>) {
        let root = app_dirs::app_root_dir().expect("app root");
        let store = HistoryDatabase::open(config.recorder.database_path_in(&root))
            .expect("open history");
        let cell = Arc::new(LatestSample::with_authorization(status));
        let recorder = ParkingRecorder::from_config(cell.clone(), config).with_store(Arc::new(store));
        (cell, Arc::new(recorder))
    }

    fn tick(&self, offset_secs: i64, speed: f64) -> TickOutcome {
        self.cell.publish(sample(START + offset_secs, speed));
        self.recorder.evaluate_tick()
    }
}

fn sample(unix_seconds: i64, speed: f64) -> Sample {
    Sample {
        timestamp: OffsetDateTime::from_unix_timestamp(unix_seconds).expect("timestamp"),
        latitude: 22.3193,
        longitude: 114.1694,
        altitude: 12.0,
        speed,
        horizontal_accuracy: 5.0,
    }
}

#[test]
fn parked_car_is_recorded_and_persisted() {
    let harness = SessionHarness::new(AppConfig::default());
    assert!(harness.tick(0, 15.0).snapshot().is_none());
    let recorded = harness.tick(30, 0.0);
    let snapshot = recorded.snapshot().expect("stop recorded").clone();
    assert!(harness.tick(60, 0.0).snapshot().is_none());

    let root = app_dirs::app_root_dir().expect("app root");
    assert!(root.join(HISTORY_DB_FILE_NAME).is_file());
    let (_, reopened) =
        SessionHarness::open_recorder(&harness.config, AuthorizationStatus::AuthorizedAlways);
    let history = reopened.history(SortOrder::Ascending).expect("history");
    assert_eq!(history, vec![snapshot.clone()]);
    assert_eq!(history[0].timestamp.unix_timestamp(), START + 30);
    assert_eq!(history[0].speed, 0.0);
}

#[test]
fn cycling_home_then_sweeping_after_three_days() {
    let harness = SessionHarness::new(AppConfig::default());
    harness.tick(0, 4.0);
    harness.tick(30, 4.0);
    assert_eq!(harness.recorder.last_moving_mode(), Some(TravelMode::Bicycle));
    assert!(harness.tick(60, 0.5).snapshot().is_some());

    let recorded_at = OffsetDateTime::from_unix_timestamp(START + 60).expect("timestamp");
    let at_boundary = harness
        .recorder
        .sweep_expired(recorded_at + time::Duration::hours(72))
        .expect("sweep");
    assert_eq!(at_boundary.deleted, 0);

    let past_boundary = harness
        .recorder
        .sweep_expired(recorded_at + time::Duration::hours(72) + time::Duration::seconds(1))
        .expect("sweep");
    assert_eq!(past_boundary.deleted, 1);
    assert!(
        harness
            .recorder
            .history(SortOrder::Ascending)
            .expect("history")
            .is_empty()
    );
}

#[test]
fn denied_permission_records_nothing() {
    let harness = SessionHarness::new(AppConfig::default());
    let (cell, recorder) =
        SessionHarness::open_recorder(&harness.config, AuthorizationStatus::Denied);
    cell.publish(sample(START, 0.0));
    assert!(matches!(
        recorder.record_now(),
        Err(RecorderError::Unauthorized)
    ));
    assert!(recorder.permission_alert());
    assert!(
        recorder
            .history(SortOrder::Ascending)
            .expect("history")
            .is_empty()
    );
}

#[test]
fn scheduler_records_from_live_fixes() {
    let mut config = AppConfig::default();
    config.recorder.tick_interval_secs = 1;
    let harness = SessionHarness::new(config);
    assert_eq!(harness.recorder.tick_interval(), Duration::from_secs(1));

    let mut scheduler = EvaluationScheduler::new();
    harness.cell.publish(sample(START, 20.0));
    harness
        .recorder
        .start_scheduler(&mut scheduler)
        .expect("start scheduler");

    let deadline = Instant::now() + Duration::from_secs(10);
    while harness.recorder.last_moving_mode().is_none() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    harness.cell.publish(sample(START + 30, 0.0));
    let mut history = Vec::new();
    while history.is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
        history = harness
            .recorder
            .history(SortOrder::Ascending)
            .expect("history");
    }
    scheduler.stop();
    assert!(!scheduler.is_running());
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].timestamp.unix_timestamp(), START + 30);
}

#[test]
fn history_view_sweeps_before_listing() {
    let harness = SessionHarness::new(AppConfig::default());
    harness.cell.publish(sample(1_000_000_000, 0.0));
    harness.recorder.record_now().expect("record old fix");
    harness.cell.publish(sample(START, 0.0));
    let recent = harness.recorder.record_now().expect("record recent fix");

    let (_, reopened) =
        SessionHarness::open_recorder(&harness.config, AuthorizationStatus::AuthorizedAlways);
    let now = OffsetDateTime::from_unix_timestamp(START + 60).expect("now");
    for _ in 0..2 {
        let listed = reopened
            .open_history(now, SortOrder::Ascending)
            .expect("open history");
        assert_eq!(listed, vec![recent.clone()]);
    }
}
