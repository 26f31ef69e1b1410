//! Fixed-cadence driver for the evaluation step.

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::mpsc::{self, RecvTimeoutError, Sender},
    thread::{self, JoinHandle},
    time::Duration,
};

use tracing::{debug, error};

/// Default delay between evaluation ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(30);

const SCHEDULER_THREAD_NAME: &str = "autopark-scheduler";

/// Runs a tick callback on a dedicated thread at a fixed interval.
///
/// At most one worker is alive at a time. The worker waits on its shutdown
/// channel between ticks, so `stop` wakes it immediately and joins it; once
/// `stop` returns no further tick can fire.
#[derive(Default)]
pub struct EvaluationScheduler {
    worker: Option<SchedulerWorker>,
}

struct SchedulerWorker {
    shutdown_tx: Sender<()>,
    join_handle: JoinHandle<()>,
}

impl EvaluationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start ticking every `interval`, replacing any running worker.
    ///
    /// The first tick fires one interval after the call. The interval is
    /// measured from the end of the previous tick, and missed time is never
    /// made up.
    pub fn start<F>(&mut self, interval: Duration, mut tick: F) -> std::io::Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        self.stop();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let join_handle = thread::Builder::new()
            .name(SCHEDULER_THREAD_NAME.to_string())
            .spawn(move || {
                loop {
                    match shutdown_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            if catch_unwind(AssertUnwindSafe(&mut tick)).is_err() {
                                error!("Evaluation tick panicked; scheduler keeps running");
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Evaluation scheduler stopped");
            })?;
        debug!("Evaluation scheduler started with {interval:?} interval");
        self.worker = Some(SchedulerWorker {
            shutdown_tx,
            join_handle,
        });
        Ok(())
    }

    /// Stop the worker and wait for an in-flight tick to finish. Idempotent.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.shutdown_tx.send(());
            if worker.join_handle.join().is_err() {
                error!("Evaluation scheduler thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for EvaluationScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
