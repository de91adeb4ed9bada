//! Test harness for isolated pipeline runs.
//!
//! `TestHarness` builds a complete temporary stage tree, an in-memory
//! index store, and a scripted recognition engine, then runs the real
//! coordinator against them. Per-file scripts decide what each OCR
//! attempt returns, so retry and failure paths are exercised without a
//! real OCR engine.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tempfile::TempDir;

use scandex::coordinator::CoordinatorHandle;
use scandex::db::document_repo;
use scandex::processor::TextEngine;
use scandex::{Config, Coordinator, Database, ProcessError, RunSummary, ScannedDocument};

/// Document text containing every recognized metadata field.
pub const FULL_TEXT: &str = "Account Number: 00012345\nName: Jane Doe";
/// Document text containing only the account number.
pub const ACCOUNT_ONLY_TEXT: &str = "Account Number: 00012345\nNo other details.";

/// What one recognition attempt returns.
#[derive(Debug, Clone)]
pub enum Step {
    Text(&'static str),
    Empty,
    EngineFailure(&'static str),
}

/// Recognition engine driven by per-filename scripts.
///
/// Each call consumes the next step of the file's script; the last step
/// repeats once the script is exhausted. Files without a script use the
/// fallback step.
pub struct ScriptedEngine {
    scripts: Mutex<HashMap<String, Vec<Step>>>,
    calls: Mutex<HashMap<String, usize>>,
    fallback: Step,
}

impl ScriptedEngine {
    pub fn new(fallback: Step) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            fallback,
        }
    }

    pub fn script(&self, filename: &str, steps: Vec<Step>) {
        assert!(!steps.is_empty(), "script must have at least one step");
        self.scripts
            .lock()
            .unwrap()
            .insert(filename.to_string(), steps);
    }

    /// Number of recognition attempts made for `filename` so far.
    pub fn calls(&self, filename: &str) -> usize {
        self.calls.lock().unwrap().get(filename).copied().unwrap_or(0)
    }

    fn next_step(&self, filename: &str) -> Step {
        let mut calls = self.calls.lock().unwrap();
        let attempt = calls.entry(filename.to_string()).or_insert(0);
        let index = *attempt;
        *attempt += 1;

        let scripts = self.scripts.lock().unwrap();
        match scripts.get(filename) {
            Some(steps) => steps[index.min(steps.len() - 1)].clone(),
            None => self.fallback.clone(),
        }
    }
}

impl TextEngine for ScriptedEngine {
    fn extract_text(&self, path: &Path) -> Result<String, ProcessError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        match self.next_step(&filename) {
            Step::Text(text) => Ok(text.to_string()),
            Step::Empty => Err(ProcessError::EmptyText),
            Step::EngineFailure(reason) => Err(ProcessError::Engine(reason.to_string())),
        }
    }
}

/// A coordinator running on a background thread.
pub struct RunningPipeline {
    shutdown: Arc<AtomicBool>,
    pub handle: CoordinatorHandle,
    runner: JoinHandle<RunSummary>,
}

impl RunningPipeline {
    /// Flips the shutdown flag and waits for the run to drain.
    pub fn stop(self) -> RunSummary {
        self.shutdown.store(true, Ordering::Relaxed);
        self.runner.join().expect("coordinator thread panicked")
    }
}

/// Isolated environment: temporary stage tree, in-memory store, scripted
/// engine, and timings tightened so tests finish in well under a second
/// per stage transition.
pub struct TestHarness {
    temp_dir: TempDir,
    pub config: Config,
    pub db: Database,
    pub engine: Arc<ScriptedEngine>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_fallback(Step::Text(FULL_TEXT))
    }

    pub fn with_fallback(fallback: Step) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();

        let mut config = Config::default();
        config.scan_dir = root.join("incoming-scan");
        config.fully_indexed_dir = root.join("fully_indexed");
        config.partial_indexed_dir = root.join("partially_indexed");
        config.failed_dir = root.join("failed");
        config.log_dir = root.join("logs");
        config.worker_count = 2;
        config.max_retries = 3;
        config.retry_delay_secs = 0.02;
        config.batch_delay_secs = 0.02;
        config.process_delay_secs = 0.0;
        config.ensure_directories().expect("Failed to create stage tree");

        Self {
            temp_dir,
            config,
            db: Database::open_in_memory().expect("Failed to open in-memory database"),
            engine: Arc::new(ScriptedEngine::new(fallback)),
        }
    }

    /// Drops a document file into the intake directory.
    pub fn drop_file(&self, filename: &str) -> PathBuf {
        let path = self.config.scan_dir.join(filename);
        std::fs::write(&path, format!("document bytes for {filename}"))
            .expect("Failed to write intake file");
        path
    }

    /// Starts a coordinator run on a background thread, using the current
    /// configuration.
    pub fn start(&self) -> RunningPipeline {
        let shutdown = Arc::new(AtomicBool::new(false));
        let coordinator = Coordinator::new(
            &self.config,
            Arc::clone(&self.engine) as Arc<dyn TextEngine>,
            self.db.clone(),
            Arc::clone(&shutdown),
        );
        let handle = coordinator.handle();
        let runner = thread::spawn(move || coordinator.run());

        RunningPipeline {
            shutdown,
            handle,
            runner,
        }
    }

    /// Polls `check` until it holds or `deadline` elapses.
    pub fn wait_until(&self, deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if check() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    pub fn scan_files(&self) -> Vec<String> {
        list_files(&self.config.scan_dir)
    }

    pub fn fully_indexed_files(&self) -> Vec<String> {
        list_files(&self.config.fully_indexed_dir)
    }

    pub fn partially_indexed_files(&self) -> Vec<String> {
        list_files(&self.config.partial_indexed_dir)
    }

    pub fn failed_files(&self) -> Vec<String> {
        list_files(&self.config.failed_dir)
    }

    pub fn record_count(&self) -> u64 {
        document_repo::count_documents(&self.db).expect("count query failed")
    }

    pub fn find_record(&self, filename: &str) -> Option<ScannedDocument> {
        document_repo::find_by_filename(&self.db, filename).expect("lookup query failed")
    }
}

fn list_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("stage directory missing")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort();
    names
}
