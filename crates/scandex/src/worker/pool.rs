use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, error, info};

use crate::db::Database;
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::processor::TextEngine;
use crate::worker::task::{DocumentTask, TaskOutcome};

/// A task handed back instead of queued.
#[derive(Debug)]
pub enum SubmitRejected {
    /// The task queue is at capacity; try again after draining outcomes.
    Full(DocumentTask),
    /// The pool is shutting down and accepts no new work.
    Shutdown(DocumentTask),
}

/// Bounded pool of worker threads running the per-document pipeline.
///
/// Each task is processed end-to-end by one worker. Channels are bounded so
/// a large batch of dropped files cannot queue unbounded work; the
/// coordinator keeps its own backlog and resubmits on [`SubmitRejected::Full`].
pub struct WorkerPool {
    task_sender: Sender<DocumentTask>,
    task_receiver: Receiver<DocumentTask>,
    outcome_receiver: Receiver<TaskOutcome>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn new(
        config: Arc<PipelineConfig>,
        engine: Arc<dyn TextEngine>,
        db: Database,
        worker_count: usize,
    ) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        let (task_sender, task_receiver) = bounded::<DocumentTask>(worker_count * 2);
        let (outcome_sender, outcome_receiver) = bounded::<TaskOutcome>(worker_count * 2);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let task_rx = task_receiver.clone();
            let outcome_tx = outcome_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_config = Arc::clone(&config);
            let worker_engine = Arc::clone(&engine);
            let worker_db = db.clone();

            let handle = thread::spawn(move || {
                run_worker(
                    worker_id,
                    task_rx,
                    outcome_tx,
                    shutdown_flag,
                    worker_config,
                    worker_engine,
                    worker_db,
                );
            });

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Self {
            task_sender,
            task_receiver,
            outcome_receiver,
            workers,
            shutdown,
        }
    }

    /// Queues a task without blocking; a full queue hands the task back.
    pub fn try_submit(&self, task: DocumentTask) -> Result<(), SubmitRejected> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(SubmitRejected::Shutdown(task));
        }

        match self.task_sender.try_send(task) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(task)) => Err(SubmitRejected::Full(task)),
            Err(TrySendError::Disconnected(task)) => Err(SubmitRejected::Shutdown(task)),
        }
    }

    pub fn try_recv_outcome(&self) -> Option<TaskOutcome> {
        self.outcome_receiver.try_recv().ok()
    }

    pub fn recv_outcome(&self) -> Option<TaskOutcome> {
        self.outcome_receiver.recv().ok()
    }

    /// Removes tasks still queued behind the workers. Called after
    /// [`WorkerPool::shutdown`]: a task drained here was never picked up
    /// by a worker, so no outcome will arrive for it.
    pub fn drain_pending(&self) -> Vec<DocumentTask> {
        let mut pending = Vec::new();
        while let Ok(task) = self.task_receiver.try_recv() {
            pending.push(task);
        }
        pending
    }

    /// A receiver for draining outcomes while [`WorkerPool::wait`] joins
    /// the workers. Disconnects once the last worker has exited.
    pub fn outcomes(&self) -> Receiver<TaskOutcome> {
        self.outcome_receiver.clone()
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn wait(self) {
        // Drop sender to signal workers to exit
        drop(self.task_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn run_worker(
    worker_id: usize,
    task_receiver: Receiver<DocumentTask>,
    outcome_sender: Sender<TaskOutcome>,
    shutdown: Arc<AtomicBool>,
    config: Arc<PipelineConfig>,
    engine: Arc<dyn TextEngine>,
    db: Database,
) {
    debug!("Worker {} started", worker_id);

    let pipeline = Pipeline::new(config, engine, db);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match task_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(task) => {
                debug!("Worker {} processing {}", worker_id, task.file_name());

                let outcome = pipeline.run(task);

                if let Err(e) = outcome_sender.send(outcome) {
                    error!("Worker {} failed to send outcome: {}", worker_id, e);
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} task channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    use crate::classify::Stage;
    use crate::error::ProcessError;
    use crate::storage::StageDirs;

    struct FixedTextEngine(String);

    impl TextEngine for FixedTextEngine {
        fn extract_text(&self, _path: &std::path::Path) -> Result<String, ProcessError> {
            Ok(self.0.clone())
        }
    }

    fn test_setup(root: &std::path::Path) -> (Arc<PipelineConfig>, Database) {
        let dirs = StageDirs {
            scan: root.join("incoming-scan"),
            fully_indexed: root.join("fully_indexed"),
            partially_indexed: root.join("partially_indexed"),
            failed: root.join("failed"),
        };
        std::fs::create_dir_all(&dirs.scan).unwrap();

        let config = Arc::new(PipelineConfig {
            dirs,
            max_retries: 3,
            store_retry_attempts: 3,
            store_retry_delay: Duration::from_millis(10),
        });
        let db = Database::open_in_memory().unwrap();
        (config, db)
    }

    #[test]
    fn test_worker_pool_creation_and_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let (config, db) = test_setup(temp_dir.path());
        let engine: Arc<dyn TextEngine> = Arc::new(FixedTextEngine("text".to_string()));

        let pool = WorkerPool::new(config, engine, db, 2);
        assert!(!pool.is_shutdown());

        pool.shutdown();
        assert!(pool.is_shutdown());

        pool.wait();
    }

    #[test]
    fn test_submit_and_process_task() {
        let temp_dir = TempDir::new().unwrap();
        let (config, db) = test_setup(temp_dir.path());
        let engine: Arc<dyn TextEngine> = Arc::new(FixedTextEngine(
            "Account Number: 00012345\nName: Jane Doe".to_string(),
        ));

        let source = config.dirs.scan.join("scan1.pdf");
        std::fs::write(&source, b"pdf bytes").unwrap();

        let pool = WorkerPool::new(Arc::clone(&config), engine, db, 2);
        pool.try_submit(DocumentTask::new(source)).unwrap();

        let outcome = pool.recv_outcome().unwrap();
        assert!(!outcome.retry);
        assert_eq!(outcome.stage, Some(Stage::FullyIndexed));
        assert!(outcome.final_path.is_some());

        pool.shutdown();
        pool.wait();
    }

    struct GatedEngine {
        entered: Sender<()>,
        release: Receiver<()>,
    }

    impl TextEngine for GatedEngine {
        fn extract_text(&self, _path: &std::path::Path) -> Result<String, ProcessError> {
            let _ = self.entered.send(());
            let _ = self.release.recv();
            Ok("Account Number: 00012345\nName: Jane Doe".to_string())
        }
    }

    #[test]
    fn test_drain_pending_returns_queued_tasks() {
        let temp_dir = TempDir::new().unwrap();
        let (config, db) = test_setup(temp_dir.path());

        let (entered_tx, entered_rx) = bounded(4);
        let (release_tx, release_rx) = bounded(4);
        let engine: Arc<dyn TextEngine> = Arc::new(GatedEngine {
            entered: entered_tx,
            release: release_rx,
        });

        let source = config.dirs.scan.join("busy.pdf");
        std::fs::write(&source, b"pdf bytes").unwrap();

        let pool = WorkerPool::new(Arc::clone(&config), engine, db, 1);
        pool.try_submit(DocumentTask::new(source)).unwrap();
        // The single worker is now blocked inside the engine call, so the
        // next two submissions stay in the task channel.
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        pool.try_submit(DocumentTask::new(PathBuf::from("/in/q1.pdf")))
            .unwrap();
        pool.try_submit(DocumentTask::new(PathBuf::from("/in/q2.pdf")))
            .unwrap();

        pool.shutdown();
        let pending = pool.drain_pending();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].source_path.ends_with("q1.pdf"));
        assert!(pending[1].source_path.ends_with("q2.pdf"));

        release_tx.send(()).unwrap();
        let outcome = pool.recv_outcome().unwrap();
        assert_eq!(outcome.stage, Some(Stage::FullyIndexed));

        pool.wait();
    }

    #[test]
    fn test_submit_after_shutdown_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let (config, db) = test_setup(temp_dir.path());
        let engine: Arc<dyn TextEngine> = Arc::new(FixedTextEngine("text".to_string()));

        let pool = WorkerPool::new(config, engine, db, 1);
        pool.shutdown();

        let task = DocumentTask::new(PathBuf::from("/in/late.pdf"));
        match pool.try_submit(task) {
            Err(SubmitRejected::Shutdown(task)) => {
                assert!(task.source_path.ends_with("late.pdf"));
            }
            other => panic!("expected Shutdown rejection, got {other:?}"),
        }

        pool.wait();
    }
}
