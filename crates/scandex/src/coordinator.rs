//! Pipeline coordinator: discovery, dispatch, retry scheduling, shutdown.
//!
//! The coordinator loop is the single owner of all cross-task state — the
//! claimed-path set, the ready backlog, and the retry due-queue. Workers
//! only ever see one task at a time, so no two workers can hold the same
//! path: a path is claimed here before submission and released only when
//! its terminal outcome is collected.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::classify::Stage;
use crate::config::Config;
use crate::db::Database;
use crate::error::WorkerError;
use crate::pipeline::PipelineConfig;
use crate::processor::{DocumentKind, TextEngine};
use crate::worker::pool::SubmitRejected;
use crate::worker::{DirectoryScanner, DocumentTask, StabilityTracker, TaskOutcome, WorkerPool};

/// Counts for one coordinator run, reported at shutdown.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub fully_indexed: u64,
    pub partially_indexed: u64,
    pub failed: u64,
    pub retries_scheduled: u64,
    /// Tasks still waiting (backlog or retry backoff) when shutdown hit;
    /// their files stay in the intake directory for the next run's rescan.
    pub pending_at_shutdown: u64,
}

/// Write trigger for externally announced files ("process this now").
#[derive(Clone)]
pub struct CoordinatorHandle {
    trigger_tx: Sender<PathBuf>,
}

impl CoordinatorHandle {
    /// Submits a freshly written file for processing, bypassing the settle
    /// wait. The caller vouches that the write is complete.
    pub fn submit_now(&self, path: PathBuf) -> Result<(), WorkerError> {
        self.trigger_tx
            .send(path)
            .map_err(|_| WorkerError::ChannelClosed)
    }
}

struct ScheduledRetry {
    due_at: Instant,
    task: DocumentTask,
}

pub struct Coordinator {
    scanner: DirectoryScanner,
    tracker: StabilityTracker,
    pool: WorkerPool,
    /// Paths currently owned by a task, from claim until terminal outcome.
    in_flight: HashSet<PathBuf>,
    /// Claimed tasks waiting for pool capacity.
    ready: VecDeque<DocumentTask>,
    /// Claimed tasks waiting out their retry backoff.
    retries: Vec<ScheduledRetry>,
    trigger_tx: Sender<PathBuf>,
    trigger_rx: Receiver<PathBuf>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    shutdown: Arc<AtomicBool>,
    batch_delay: Duration,
    retry_delay: Duration,
    summary: RunSummary,
}

impl Coordinator {
    pub fn new(
        config: &Config,
        engine: Arc<dyn TextEngine>,
        db: Database,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let pipeline_config = Arc::new(PipelineConfig::from_config(config));
        let pool = WorkerPool::new(pipeline_config, engine, db, config.worker_count);
        let (trigger_tx, trigger_rx) = unbounded();
        let (wake_tx, wake_rx) = bounded(16);

        Self {
            scanner: DirectoryScanner::new(&config.scan_dir),
            tracker: StabilityTracker::new(config.process_delay()),
            pool,
            in_flight: HashSet::new(),
            ready: VecDeque::new(),
            retries: Vec::new(),
            trigger_tx,
            trigger_rx,
            wake_tx,
            wake_rx,
            shutdown,
            batch_delay: config.batch_delay(),
            retry_delay: config.retry_delay(),
            summary: RunSummary::default(),
        }
    }

    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle {
            trigger_tx: self.trigger_tx.clone(),
        }
    }

    /// Runs the batch loop until the shutdown flag flips, then drains
    /// in-flight work and reports the run's counts.
    pub fn run(mut self) -> RunSummary {
        info!(
            "Coordinator started, watching {}",
            self.scanner.scan_dir().display()
        );
        let watch_handle = self.spawn_watch_thread();

        while !self.shutdown.load(Ordering::Relaxed) {
            self.collect_outcomes();
            self.drain_triggers();
            self.discover();
            self.release_due_retries();
            self.dispatch_ready();

            // Parked until the next batch tick; a watch event wakes early.
            let _ = self.wake_rx.recv_timeout(self.batch_delay);
        }

        let summary = self.finish_run();
        if let Some(handle) = watch_handle {
            let _ = handle.join();
        }
        summary
    }

    /// Filesystem-event mode: change events only wake the scan loop early;
    /// emitted paths still pass through the stability gate.
    fn spawn_watch_thread(&self) -> Option<JoinHandle<()>> {
        let scanner = DirectoryScanner::new(self.scanner.scan_dir());
        let wake_tx = self.wake_tx.clone();
        let shutdown = Arc::clone(&self.shutdown);

        Some(thread::spawn(move || {
            let result = scanner.watch(
                move |_path| {
                    let _ = wake_tx.try_send(());
                },
                shutdown,
            );
            if let Err(e) = result {
                warn!("Filesystem watch unavailable, relying on polling: {}", e);
            }
        }))
    }

    fn collect_outcomes(&mut self) {
        while let Some(outcome) = self.pool.try_recv_outcome() {
            if outcome.retry {
                self.schedule_retry(outcome);
            } else {
                record_terminal(&mut self.summary, &mut self.in_flight, &outcome);
            }
        }
    }

    fn schedule_retry(&mut self, outcome: TaskOutcome) {
        debug!(
            "Re-enqueueing {} (attempt {}) after backoff: {}",
            outcome.task.file_name(),
            outcome.task.attempts,
            outcome.error.as_deref().unwrap_or("unknown error"),
        );
        self.summary.retries_scheduled += 1;
        // The claim is held across retries; the file is still in intake.
        self.retries.push(ScheduledRetry {
            due_at: Instant::now() + self.retry_delay,
            task: outcome.task,
        });
    }

    fn drain_triggers(&mut self) {
        while let Ok(path) = self.trigger_rx.try_recv() {
            if DocumentKind::from_path(&path).is_none() {
                warn!("Ignoring trigger for unsupported file: {}", path.display());
                continue;
            }
            if !path.is_file() {
                warn!("Ignoring trigger for missing file: {}", path.display());
                continue;
            }
            self.claim(path);
        }
    }

    fn discover(&mut self) {
        let candidates = match self.scanner.scan() {
            Ok(candidates) => candidates,
            Err(e) => {
                error!("Intake scan failed: {}", e);
                return;
            }
        };

        for path in self.tracker.observe(&candidates) {
            self.claim(path);
        }
    }

    /// Claims a path into the in-flight set and queues its task. A path
    /// already claimed (processing, backlogged, or awaiting retry) is left
    /// alone — at most one live task per path.
    fn claim(&mut self, path: PathBuf) {
        if !self.in_flight.insert(path.clone()) {
            debug!("Already in flight, skipping: {}", path.display());
            return;
        }
        debug!("Claimed {}", path.display());
        self.ready.push_back(DocumentTask::new(path));
    }

    fn release_due_retries(&mut self) {
        let now = Instant::now();
        let mut index = 0;
        while index < self.retries.len() {
            if self.retries[index].due_at <= now {
                let retry = self.retries.swap_remove(index);
                self.ready.push_back(retry.task);
            } else {
                index += 1;
            }
        }
    }

    fn dispatch_ready(&mut self) {
        while let Some(task) = self.ready.pop_front() {
            match self.pool.try_submit(task) {
                Ok(()) => {}
                Err(SubmitRejected::Full(task)) => {
                    // Pool at capacity; keep the backlog for the next tick.
                    self.ready.push_front(task);
                    break;
                }
                Err(SubmitRejected::Shutdown(task)) => {
                    self.ready.push_front(task);
                    break;
                }
            }
        }
    }

    /// Stops intake, lets workers finish the task they hold, and collects
    /// the remaining outcomes. Backlogged and backoff-waiting tasks are not
    /// started; their files stay in intake for the next run's rescan.
    fn finish_run(mut self) -> RunSummary {
        self.summary.pending_at_shutdown = (self.ready.len() + self.retries.len()) as u64;

        self.pool.shutdown();

        // Tasks submitted but never picked up by a worker count as pending
        // too; like the backlog, their files are still in intake.
        for task in self.pool.drain_pending() {
            debug!("Leaving queued task {} for the next run", task.file_name());
            self.summary.pending_at_shutdown += 1;
        }

        if self.summary.pending_at_shutdown > 0 {
            info!(
                "{} pending tasks left in intake for the next run",
                self.summary.pending_at_shutdown
            );
        }

        let outcomes = self.pool.outcomes();

        let Coordinator {
            pool,
            mut summary,
            mut in_flight,
            ..
        } = self;

        let waiter = thread::spawn(move || pool.wait());

        // Ends when the last worker exits and the buffer is drained.
        for outcome in outcomes.iter() {
            if outcome.retry {
                debug!(
                    "Dropping retry for {} at shutdown",
                    outcome.task.file_name()
                );
                summary.pending_at_shutdown += 1;
            } else {
                record_terminal(&mut summary, &mut in_flight, &outcome);
            }
        }

        if waiter.join().is_err() {
            error!("Worker pool wait thread panicked");
        }

        summary
    }
}

fn record_terminal(summary: &mut RunSummary, in_flight: &mut HashSet<PathBuf>, outcome: &TaskOutcome) {
    in_flight.remove(&outcome.task.source_path);

    match outcome.stage {
        Some(Stage::FullyIndexed) => summary.fully_indexed += 1,
        Some(Stage::PartiallyIndexed) => summary.partially_indexed += 1,
        Some(Stage::Failed) | None => summary.failed += 1,
        Some(Stage::Discovered) | Some(Stage::Processing) => {}
    }

    match &outcome.error {
        Some(error) => warn!(
            "{} -> {} after {} attempts: {}",
            outcome.task.file_name(),
            outcome.stage.map(|s| s.as_str()).unwrap_or("failed"),
            outcome.task.attempts,
            error,
        ),
        None => info!(
            "{} -> {} (attempt {})",
            outcome.task.file_name(),
            outcome.stage.map(|s| s.as_str()).unwrap_or("failed"),
            outcome.task.attempts,
        ),
    }
}
