//! Document stage machine and per-attempt classification.

use std::fmt;

use serde::Serialize;

use crate::error::ProcessError;
use crate::extract::ExtractionResult;

/// Lifecycle stage of a document task.
///
/// `Discovered` and `Processing` exist only in memory; the three terminal
/// stages are encoded durably by the directory a file lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discovered,
    Processing,
    FullyIndexed,
    PartiallyIndexed,
    Failed,
}

impl Stage {
    /// Terminal stages are final — no automatic reprocessing.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Stage::FullyIndexed | Stage::PartiallyIndexed | Stage::Failed
        )
    }

    /// Whether documents reaching this stage get an index record.
    pub fn is_indexed(&self) -> bool {
        matches!(self, Stage::FullyIndexed | Stage::PartiallyIndexed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Discovered => "discovered",
            Stage::Processing => "processing",
            Stage::FullyIndexed => "fully_indexed",
            Stage::PartiallyIndexed => "partially_indexed",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Route the document to a terminal stage now.
    Terminal(Stage),
    /// Re-enqueue the document after the backoff delay.
    Retry,
}

/// Applies the transition rule once per attempt.
pub struct Classifier {
    max_retries: u32,
}

impl Classifier {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Decides where a document goes after one attempt.
    ///
    /// `attempts` counts completed attempts including the one being
    /// classified. A full field set is FullyIndexed, a non-empty subset is
    /// PartiallyIndexed; zero fields or an OCR failure consumes one attempt
    /// from the budget and ends in Failed once the budget is spent.
    pub fn decide(
        &self,
        outcome: &Result<ExtractionResult, ProcessError>,
        attempts: u32,
    ) -> Decision {
        match outcome {
            Ok(result) if result.fields.all_found() => Decision::Terminal(Stage::FullyIndexed),
            Ok(result) if !result.fields.none_found() => {
                Decision::Terminal(Stage::PartiallyIndexed)
            }
            _ => {
                if attempts < self.max_retries {
                    Decision::Retry
                } else {
                    Decision::Terminal(Stage::Failed)
                }
            }
        }
    }
}
