//! Document tasks and their per-attempt outcomes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::classify::Stage;

/// One unit of work per physical file in the intake directory.
///
/// `attempts` and the timestamps travel with the task through the worker
/// channels; the directory the file lives in is the durable stage.
#[derive(Debug, Clone)]
pub struct DocumentTask {
    pub source_path: PathBuf,
    /// Completed processing attempts, starts at 0.
    pub attempts: u32,
    pub first_seen_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// MIME type of the source file (e.g., "application/pdf", "image/png").
    pub mime_type: Option<String>,
}

impl DocumentTask {
    pub fn new(source_path: PathBuf) -> Self {
        let mime_type = Self::detect_mime_type(&source_path);
        Self {
            source_path,
            attempts: 0,
            first_seen_at: Utc::now(),
            last_attempt_at: None,
            mime_type,
        }
    }

    /// Marks the start of a processing attempt.
    pub fn begin_attempt(&mut self) {
        self.attempts += 1;
        self.last_attempt_at = Some(Utc::now());
    }

    pub fn file_name(&self) -> String {
        crate::sanitize::redact_path(&self.source_path)
    }

    /// Detects MIME type from file path using the mime_guess crate.
    /// Returns `None` for unknown extensions.
    fn detect_mime_type(path: &Path) -> Option<String> {
        mime_guess::from_path(path).first().map(|m| m.to_string())
    }
}

/// Result of one processing attempt, sent back to the coordinator.
#[derive(Debug)]
pub struct TaskOutcome {
    pub task: DocumentTask,
    /// True when the attempt failed retryably and the task should be
    /// re-enqueued after backoff; the file is still in the intake directory.
    pub retry: bool,
    /// Terminal stage reached, set when `retry` is false.
    pub stage: Option<Stage>,
    /// Where the file ended up after relocation.
    pub final_path: Option<PathBuf>,
    /// Index record id for fully/partially indexed outcomes.
    pub record_id: Option<i64>,
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn retry(task: DocumentTask, error: String) -> Self {
        Self {
            task,
            retry: true,
            stage: None,
            final_path: None,
            record_id: None,
            error: Some(error),
        }
    }

    pub fn terminal(
        task: DocumentTask,
        stage: Stage,
        final_path: Option<PathBuf>,
        record_id: Option<i64>,
        error: Option<String>,
    ) -> Self {
        Self {
            task,
            retry: false,
            stage: Some(stage),
            final_path,
            record_id,
            error,
        }
    }
}
