use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info_span, warn};

use crate::classify::{Classifier, Decision, Stage};
use crate::db::{document_repo, Database, DatabaseError};
use crate::error::ProcessError;
use crate::extract::{DocumentFields, ExtractionResult, FieldExtractor};
use crate::processor::TextEngine;
use crate::storage::Relocator;
use crate::worker::task::{DocumentTask, TaskOutcome};

use super::config::PipelineConfig;

/// Runs one document attempt end-to-end: recognize → extract → classify →
/// relocate → index.
///
/// Each worker owns one `Pipeline`; the engine and database handles are
/// shared. The pipeline never deletes a document and never leaves one
/// observable in two stage directories.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    engine: Arc<dyn TextEngine>,
    extractor: FieldExtractor,
    classifier: Classifier,
    relocator: Relocator,
    db: Database,
}

impl Pipeline {
    pub fn new(config: Arc<PipelineConfig>, engine: Arc<dyn TextEngine>, db: Database) -> Self {
        let classifier = Classifier::new(config.max_retries);
        let relocator = Relocator::new(config.dirs.clone());

        Self {
            config,
            engine,
            extractor: FieldExtractor::new(),
            classifier,
            relocator,
            db,
        }
    }

    /// Processes one attempt for the task and reports how it ended.
    pub fn run(&self, mut task: DocumentTask) -> TaskOutcome {
        task.begin_attempt();
        let filename = task.file_name();
        let _pipeline_span = info_span!(
            "pipeline",
            filename = %filename,
            mime = task.mime_type.as_deref().unwrap_or("unknown"),
            attempt = task.attempts
        )
        .entered();

        let recognized = {
            let _step = info_span!("recognize").entered();
            self.engine.extract_text(&task.source_path)
        };

        let extraction: Result<ExtractionResult, ProcessError> = match recognized {
            Ok(text) => {
                let _step = info_span!("extract_fields").entered();
                let fields = self.extractor.extract(&text);
                let result = ExtractionResult::new(text, fields);
                debug!(
                    fields_found = result.fields_found(),
                    text_chars = result.raw_text.chars().count(),
                    "Extracted metadata fields"
                );
                Ok(result)
            }
            Err(e) => Err(e),
        };

        let decision = self.classifier.decide(&extraction, task.attempts);

        match decision {
            Decision::Retry => {
                let reason = describe_attempt_failure(&extraction);
                debug!(
                    attempt = task.attempts,
                    max_retries = self.config.max_retries,
                    "Attempt failed retryably: {reason}"
                );
                TaskOutcome::retry(task, reason)
            }
            Decision::Terminal(Stage::Failed) => {
                let reason = describe_attempt_failure(&extraction);
                warn!("Attempt budget spent: {reason}");
                self.finish(task, Stage::Failed, None, Some(reason))
            }
            Decision::Terminal(stage) => {
                self.finish(task, stage, extraction.ok().map(|r| r.fields), None)
            }
        }
    }

    /// Routes the document to its terminal stage: move first, index write
    /// second. An index write that ultimately fails demotes the document to
    /// Failed with a best-effort move to the failed directory.
    fn finish(
        &self,
        task: DocumentTask,
        stage: Stage,
        fields: Option<DocumentFields>,
        error: Option<String>,
    ) -> TaskOutcome {
        let final_path = {
            let _step = info_span!("relocate", target = %stage).entered();
            match self.relocator.relocate(&task.source_path, stage) {
                Ok(path) => path,
                Err(e) => {
                    // The file stays in the intake directory; surfaced to
                    // operators, never silently dropped.
                    warn!("Failed to relocate '{}': {}", task.file_name(), e);
                    return TaskOutcome::terminal(
                        task,
                        Stage::Failed,
                        None,
                        None,
                        Some(e.to_string()),
                    );
                }
            }
        };

        if !stage.is_indexed() {
            return TaskOutcome::terminal(task, stage, Some(final_path), None, error);
        }

        let fields = fields.unwrap_or_default();
        match self.write_record(&final_path, &fields) {
            Ok(record_id) => TaskOutcome::terminal(task, stage, Some(final_path), record_id, None),
            Err(e) => {
                warn!(
                    "Index write for '{}' failed, demoting to failed: {}",
                    task.file_name(),
                    e
                );
                let failed_path = match self.relocator.relocate(&final_path, Stage::Failed) {
                    Ok(path) => path,
                    Err(move_err) => {
                        warn!("Best-effort demotion move failed: {}", move_err);
                        final_path
                    }
                };
                TaskOutcome::terminal(
                    task,
                    Stage::Failed,
                    Some(failed_path),
                    None,
                    Some(e.to_string()),
                )
            }
        }
    }

    /// Inserts the index record, retrying transient store failures with
    /// backoff. A duplicate filename is a consistency-check failure: logged
    /// and tolerated, the existing record wins.
    fn write_record(
        &self,
        final_path: &Path,
        fields: &DocumentFields,
    ) -> Result<Option<i64>, DatabaseError> {
        let _step = info_span!("index_write").entered();

        let filename = final_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let filepath = final_path.display().to_string();
        let client_name = fields.client_name.as_deref().unwrap_or("");
        let account_number = fields.account_number.as_deref().unwrap_or("");

        let mut attempt = 0;
        loop {
            attempt += 1;
            match document_repo::insert_document(
                &self.db,
                client_name,
                account_number,
                &filename,
                &filepath,
            ) {
                Ok(id) => return Ok(Some(id)),
                Err(DatabaseError::Duplicate(name)) => {
                    warn!("Index record for '{}' already exists; keeping the existing record", name);
                    return Ok(None);
                }
                Err(e) if e.is_retryable() && attempt < self.config.store_retry_attempts => {
                    warn!(
                        "Store unavailable (attempt {}/{}): {}",
                        attempt, self.config.store_retry_attempts, e
                    );
                    std::thread::sleep(self.config.store_retry_delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn describe_attempt_failure(extraction: &Result<ExtractionResult, ProcessError>) -> String {
    match extraction {
        Ok(_) => "no recognizable fields in document text".to_string(),
        Err(e) => e.to_string(),
    }
}
