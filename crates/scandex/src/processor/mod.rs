pub mod pdf;
pub mod tesseract;

use std::path::Path;

use crate::error::ProcessError;

pub use tesseract::TesseractEngine;

/// Marker inserted between pages of a multi-page document.
pub const PAGE_BREAK: char = '\u{c}';

/// Document kinds the intake pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Image,
}

impl DocumentKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "png" | "jpg" | "jpeg" | "tif" | "tiff" => Some(DocumentKind::Image),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        Self::from_extension(ext)
    }
}

/// The recognition capability the pipeline consumes.
///
/// One call turns a document file into its full text, pages joined with
/// [`PAGE_BREAK`]. Implementations perform no retries — retry policy lives
/// in the coordinator. The production implementation is
/// [`TesseractEngine`]; tests substitute scripted engines.
pub trait TextEngine: Send + Sync {
    fn extract_text(&self, path: &Path) -> Result<String, ProcessError>;
}

/// Enforces the empty-result contract: recognition that succeeds but yields
/// only whitespace is an error, not an empty string.
pub(crate) fn require_text(text: String) -> Result<String, ProcessError> {
    if text.trim().is_empty() {
        Err(ProcessError::EmptyText)
    } else {
        Ok(text)
    }
}
