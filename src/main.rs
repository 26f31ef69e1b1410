//! Command-line front end for the parking recorder.

use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use autopark::app_dirs;
use autopark::config::{self, AppConfig};
use autopark::history::{HistoryDatabase, Snapshot, SnapshotId, SortOrder};
use autopark::location::{AuthorizationStatus, LatestSample, Sample};
use autopark::logging::{self, ConsoleTarget};
use autopark::recorder::{EvaluationScheduler, ParkingRecorder, SweepReport, TickOutcome};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };
    let console = match options.command {
        Command::Run { .. } => ConsoleTarget::Stdout,
        _ => ConsoleTarget::Stderr,
    };
    if let Err(err) = logging::init_with(console) {
        eprintln!("Logging disabled: {err}");
    }

    let config = config::load_or_default().map_err(|err| err.to_string())?;
    let db_path = match options.db_path {
        Some(path) => path,
        None => {
            let root = app_dirs::app_root_dir().map_err(|err| err.to_string())?;
            config.recorder.database_path_in(&root)
        }
    };
    let store = Arc::new(HistoryDatabase::open(&db_path).map_err(|err| err.to_string())?);

    match options.command {
        Command::Run {
            interval_secs,
            unauthorized,
            mode,
        } => run_session(config, store, interval_secs, unauthorized, mode),
        Command::History => {
            let recorder = ParkingRecorder::from_config(Arc::new(LatestSample::new()), &config)
                .with_store(store);
            let snapshots = recorder
                .open_history(OffsetDateTime::now_utc(), SortOrder::Ascending)
                .map_err(|err| err.to_string())?;
            if snapshots.is_empty() {
                println!("No parking history.");
            }
            for snapshot in &snapshots {
                print_snapshot(snapshot)?;
            }
            Ok(())
        }
        Command::Sweep => {
            let recorder = ParkingRecorder::from_config(Arc::new(LatestSample::new()), &config)
                .with_store(store);
            let report = recorder
                .sweep_expired(OffsetDateTime::now_utc())
                .map_err(|err| err.to_string())?;
            println!(
                "Swept {} of {} expired snapshots ({} failed)",
                report.deleted, report.expired, report.failed
            );
            Ok(())
        }
        Command::Record { sample } => {
            let record: SampleRecord =
                serde_json::from_str(&sample).map_err(|err| format!("Invalid sample: {err}"))?;
            let cell = Arc::new(LatestSample::with_authorization(
                AuthorizationStatus::AuthorizedWhenInUse,
            ));
            cell.publish(record.into_sample()?);
            let recorder = ParkingRecorder::from_config(cell, &config).with_store(store);
            let snapshot = recorder.record_now().map_err(|err| err.to_string())?;
            print_snapshot(&snapshot)
        }
        Command::Delete { id } => {
            let id = SnapshotId::parse(&id).map_err(|err| err.to_string())?;
            let recorder = ParkingRecorder::from_config(Arc::new(LatestSample::new()), &config)
                .with_store(store);
            if recorder.delete_snapshot(&id).map_err(|err| err.to_string())? {
                println!("Deleted {id}");
            } else {
                println!("No snapshot with id {id}");
            }
            Ok(())
        }
    }
}

fn run_session(
    mut config: AppConfig,
    store: Arc<HistoryDatabase>,
    interval_secs: Option<u64>,
    unauthorized: bool,
    mode: Option<RunMode>,
) -> Result<(), String> {
    if let Some(secs) = interval_secs {
        config.recorder.tick_interval_secs = secs.max(1);
    }
    let status = if unauthorized {
        AuthorizationStatus::Denied
    } else {
        AuthorizationStatus::AuthorizedAlways
    };
    let cell = Arc::new(LatestSample::with_authorization(status));
    let recorder = Arc::new(ParkingRecorder::from_config(cell.clone(), &config).with_store(store));

    // Expired entries go before the session starts.
    startup_sweep(&recorder, OffsetDateTime::now_utc());

    let stdin = std::io::stdin();
    let mode = mode.unwrap_or(if stdin.is_terminal() {
        RunMode::Live
    } else {
        RunMode::Replay
    });
    match mode {
        RunMode::Replay => {
            let recorded = replay_samples(stdin.lock(), &cell, &recorder)?;
            tracing::info!("Replay finished: {recorded} parking locations recorded");
        }
        RunMode::Live => {
            let mut scheduler = EvaluationScheduler::new();
            recorder
                .start_scheduler(&mut scheduler)
                .map_err(|err| format!("Failed to start scheduler: {err}"))?;
            let fed = read_samples(stdin.lock(), |sample| cell.publish(sample));
            scheduler.stop();
            fed?;
        }
    }
    if recorder.permission_alert() {
        eprintln!("Location permission is required to record parking locations.");
    }
    Ok(())
}

/// Feed every sample through the recorder, one evaluation per sample.
///
/// Returns how many snapshots were recorded.
fn replay_samples(
    input: impl BufRead,
    cell: &LatestSample,
    recorder: &ParkingRecorder,
) -> Result<usize, String> {
    let mut recorded = 0usize;
    read_samples(input, |sample| {
        cell.publish(sample);
        if let TickOutcome::Recorded { .. } = recorder.evaluate_tick() {
            recorded += 1;
        }
    })?;
    Ok(recorded)
}

/// Sweep once before a session; a failure is logged and the session goes on.
fn startup_sweep(recorder: &ParkingRecorder, now: OffsetDateTime) -> Option<SweepReport> {
    match recorder.sweep_expired(now) {
        Ok(report) => {
            tracing::info!(
                "Startup sweep removed {} of {} expired snapshots",
                report.deleted,
                report.expired
            );
            Some(report)
        }
        Err(err) => {
            tracing::warn!("Startup sweep skipped: {err}");
            None
        }
    }
}

/// Parse JSON-lines samples, skipping blank and malformed lines.
fn read_samples(input: impl BufRead, mut on_sample: impl FnMut(Sample)) -> Result<(), String> {
    for (index, line) in input.lines().enumerate() {
        let line = line.map_err(|err| format!("Failed to read input: {err}"))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<SampleRecord>(line)
            .map_err(|err| err.to_string())
            .and_then(SampleRecord::into_sample)
        {
            Ok(sample) => on_sample(sample),
            Err(err) => tracing::warn!("Skipping input line {}: {err}", index + 1),
        }
    }
    Ok(())
}

fn print_snapshot(snapshot: &Snapshot) -> Result<(), String> {
    let when = snapshot
        .timestamp
        .format(&Rfc3339)
        .map_err(|err| err.to_string())?;
    println!(
        "{}\t{}\t{}\t{:.1} m\t{:.1} m/s\t±{:.1} m",
        snapshot.id,
        when,
        snapshot.coordinate(),
        snapshot.altitude,
        snapshot.speed,
        snapshot.accuracy
    );
    Ok(())
}

/// One position fix as read from JSON input.
#[derive(Debug, Deserialize)]
struct SampleRecord {
    /// Unix time in seconds.
    #[serde(default)]
    timestamp: Option<f64>,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    altitude: f64,
    #[serde(default = "missing_speed")]
    speed: f64,
    #[serde(default)]
    accuracy: f64,
}

fn missing_speed() -> f64 {
    -1.0
}

impl SampleRecord {
    fn into_sample(self) -> Result<Sample, String> {
        let timestamp = match self.timestamp {
            None => OffsetDateTime::now_utc(),
            Some(seconds) if !seconds.is_finite() => {
                return Err(format!("Invalid timestamp: {seconds}"));
            }
            Some(seconds) => {
                let nanos = (seconds * 1_000_000_000.0) as i128;
                OffsetDateTime::from_unix_timestamp_nanos(nanos)
                    .map_err(|err| format!("Invalid timestamp {seconds}: {err}"))?
            }
        };
        Ok(Sample {
            timestamp,
            latitude: self.latitude,
            longitude: self.longitude,
            altitude: self.altitude,
            speed: self.speed,
            horizontal_accuracy: self.accuracy,
        })
    }
}

/// How `run` turns input lines into evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    /// Samples land in the latest-value cell and the scheduler ticks on its interval.
    Live,
    /// Every sample is evaluated as soon as it is read.
    Replay,
}

#[derive(Debug, PartialEq)]
enum Command {
    Run {
        interval_secs: Option<u64>,
        unauthorized: bool,
        mode: Option<RunMode>,
    },
    History,
    Sweep,
    Record {
        sample: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Debug, PartialEq)]
struct Options {
    db_path: Option<PathBuf>,
    command: Command,
}

fn parse_args(args: Vec<String>) -> Result<Option<Options>, String> {
    let mut db_path = None;
    let mut command_name = None;
    let mut interval_secs = None;
    let mut unauthorized = false;
    let mut mode = None;
    let mut sample = None;
    let mut positional = Vec::new();
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--db" => {
                idx += 1;
                let Some(value) = args.get(idx) else {
                    return Err("--db requires a value".into());
                };
                db_path = Some(PathBuf::from(value));
            }
            "--interval-secs" => {
                idx += 1;
                let Some(value) = args.get(idx) else {
                    return Err("--interval-secs requires a value".into());
                };
                let secs = value
                    .parse::<u64>()
                    .map_err(|_| format!("Invalid --interval-secs value: {value}"))?;
                interval_secs = Some(secs);
            }
            "--unauthorized" => unauthorized = true,
            flag @ ("--live" | "--replay") => {
                let wanted = if flag == "--live" {
                    RunMode::Live
                } else {
                    RunMode::Replay
                };
                if mode.is_some_and(|chosen| chosen != wanted) {
                    return Err("--live and --replay cannot be combined".into());
                }
                mode = Some(wanted);
            }
            "--sample" => {
                idx += 1;
                let Some(value) = args.get(idx) else {
                    return Err("--sample requires a value".into());
                };
                sample = Some(value.clone());
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown argument: {arg}\n\n{}", help_text()));
            }
            arg if command_name.is_none() => command_name = Some(arg.to_string()),
            arg => positional.push(arg.to_string()),
        }
        idx += 1;
    }

    let Some(command_name) = command_name else {
        return Err(help_text());
    };
    let command = match command_name.as_str() {
        "run" => Command::Run {
            interval_secs,
            unauthorized,
            mode,
        },
        "history" => Command::History,
        "sweep" => Command::Sweep,
        "record" => Command::Record {
            sample: sample.ok_or_else(|| "record requires --sample <json>".to_string())?,
        },
        "delete" => Command::Delete {
            id: positional
                .first()
                .cloned()
                .ok_or_else(|| "delete requires a snapshot id".to_string())?,
        },
        other => return Err(format!("Unknown command: {other}\n\n{}", help_text())),
    };
    let accepted = usize::from(matches!(command, Command::Delete { .. }));
    if let Some(extra) = positional.get(accepted) {
        return Err(format!("Unexpected argument: {extra}"));
    }
    Ok(Some(Options { db_path, command }))
}

fn help_text() -> String {
    [
        "autopark",
        "",
        "Record parking locations from a stream of position fixes.",
        "",
        "Usage:",
        "  autopark [--db <path>] run [--live | --replay] [--interval-secs <n>] [--unauthorized]",
        "  autopark [--db <path>] history",
        "  autopark [--db <path>] sweep",
        "  autopark [--db <path>] record --sample <json>",
        "  autopark [--db <path>] delete <id>",
        "",
        "`run` reads one JSON sample per line from stdin, for example:",
        "  {\"timestamp\": 1714000000.5, \"latitude\": 22.3193, \"longitude\": 114.1694, \"altitude\": 12.0, \"speed\": 13.4, \"accuracy\": 5.0}",
        "A missing timestamp means the time the line was read.",
        "Piped input is replayed (one evaluation per sample); a terminal runs live.",
        "",
        "Options:",
        "  --db <path>            History database (default: <config dir>/.autopark/history.db).",
        "  --interval-secs <n>    Seconds between evaluation ticks (default from config).",
        "  --live                 Evaluate the latest sample every interval.",
        "  --replay               Evaluate each sample as soon as it is read.",
        "  --unauthorized         Simulate missing location permission.",
        "  --sample <json>        Sample recorded by `record`.",
    ]
    .join("\n")
}
