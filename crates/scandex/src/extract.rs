//! Metadata extraction from recognized document text.
//!
//! Extraction is pure and total: it never fails, never touches I/O, and an
//! absent field is `None` rather than an error. For a given input text the
//! result is identical across runs — pattern variants are tried in a fixed
//! priority order and the leftmost match wins within a variant.

use regex::Regex;

/// The closed set of metadata fields the pipeline recognizes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentFields {
    pub client_name: Option<String>,
    pub account_number: Option<String>,
}

impl DocumentFields {
    /// Size of the recognized field set.
    pub const TOTAL: u32 = 2;

    /// Number of fields that were actually found.
    pub fn found_count(&self) -> u32 {
        let mut count = 0;
        if self.client_name.is_some() {
            count += 1;
        }
        if self.account_number.is_some() {
            count += 1;
        }
        count
    }

    pub fn all_found(&self) -> bool {
        self.found_count() == Self::TOTAL
    }

    pub fn none_found(&self) -> bool {
        self.found_count() == 0
    }
}

/// Output of OCR plus metadata parsing for one document attempt.
///
/// Rebuilt from scratch on every attempt — field counts are never carried
/// over from a previous attempt of the same document.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub raw_text: String,
    pub fields: DocumentFields,
}

impl ExtractionResult {
    pub fn new(raw_text: String, fields: DocumentFields) -> Self {
        Self { raw_text, fields }
    }

    pub fn fields_found(&self) -> u32 {
        self.fields.found_count()
    }
}

/// Pattern variants for the account number, in priority order: a labeled
/// form first, then a bare digit run of 5 to 12 digits as fallback.
const ACCOUNT_PATTERNS: &[&str] = &[
    r"(?i)\b(?:account|acct)\.?\s*(?:number|no\.?|num\.?|#)?\s*[:#]?\s*(?P<value>\d{5,12})\b",
    r"\b(?P<value>\d{5,12})\b",
];

/// Pattern variants for the client name, in priority order from the most
/// specific label to the generic `Name:` line.
const NAME_PATTERNS: &[&str] = &[
    r"(?i)\b(?:client|customer)\s+name\s*[:\-]\s*(?P<value>\p{L}[\p{L} .'\-]{1,79})",
    r"(?i)\baccount\s+holder\s*(?:name\s*)?[:\-]\s*(?P<value>\p{L}[\p{L} .'\-]{1,79})",
    r"(?i)\b(?:client|customer)\s*[:\-]\s*(?P<value>\p{L}[\p{L} .'\-]{1,79})",
    r"(?i)\bname\s*[:\-]\s*(?P<value>\p{L}[\p{L} .'\-]{1,79})",
];

/// Applies the recognized pattern set to raw OCR text.
pub struct FieldExtractor {
    account_patterns: Vec<Regex>,
    name_patterns: Vec<Regex>,
}

impl FieldExtractor {
    pub fn new() -> Self {
        Self {
            account_patterns: compile_patterns(ACCOUNT_PATTERNS),
            name_patterns: compile_patterns(NAME_PATTERNS),
        }
    }

    /// Extracts the recognized fields from `text`.
    pub fn extract(&self, text: &str) -> DocumentFields {
        DocumentFields {
            client_name: first_match(&self.name_patterns, text),
            account_number: first_match(&self.account_patterns, text),
        }
    }
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn compile_patterns(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
}

/// Tries each variant in order; within a variant the leftmost match wins.
/// A capture that trims to nothing counts as absent.
fn first_match(patterns: &[Regex], text: &str) -> Option<String> {
    for pattern in patterns {
        if let Some(caps) = pattern.captures(text) {
            if let Some(matched) = caps.name("value") {
                let value = matched.as_str().trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}
