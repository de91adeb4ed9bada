//! PDF text extraction: native text layer first, rendered OCR as fallback.

use std::path::Path;
use std::process::Command;

use crate::error::ProcessError;
use crate::processor::tesseract::TesseractEngine;
use crate::processor::PAGE_BREAK;

/// Extracts the full text of a PDF, pages in order joined with
/// [`PAGE_BREAK`].
///
/// Scanned documents rarely carry a text layer, but when one is present and
/// usable it is returned without rendering anything. Otherwise every page is
/// rendered at the engine's DPI and recognized.
pub(crate) fn extract_pdf_text(
    engine: &TesseractEngine,
    path: &Path,
) -> Result<String, ProcessError> {
    let _span = tracing::info_span!("engine.pdf").entered();

    let pdf_bytes = std::fs::read(path).map_err(|e| ProcessError::ReadDocument {
        path: path.to_path_buf(),
        source: e,
    })?;

    match lopdf::Document::load_mem(&pdf_bytes) {
        Ok(doc) => {
            let text = native_text(&doc);
            if !should_use_ocr(&text) {
                return Ok(text);
            }
            let _ocr_span =
                tracing::info_span!("engine.ocr_fallback", reason = "text_quality").entered();
            ocr_pages(engine, &pdf_bytes, doc.get_pages().len())
        }
        Err(e) => {
            // lopdf can't parse this PDF (e.g. invalid cross-reference
            // table). poppler handles more variants, so render instead.
            tracing::warn!("lopdf failed to parse PDF: {}. Falling back to OCR.", e);
            let _ocr_span =
                tracing::info_span!("engine.ocr_fallback", reason = "parse_failed").entered();
            let page_count = count_pdf_pages(&pdf_bytes)?;
            ocr_pages(engine, &pdf_bytes, page_count)
        }
    }
}

/// Text from the PDF's own content streams, in page order.
fn native_text(doc: &lopdf::Document) -> String {
    let mut text = String::new();
    for (page_num, _) in doc.get_pages() {
        if let Ok(page_text) = doc.extract_text(&[page_num]) {
            if !text.is_empty() {
                text.push(PAGE_BREAK);
            }
            text.push_str(&page_text);
        }
    }
    text
}

fn ocr_pages(
    engine: &TesseractEngine,
    pdf_bytes: &[u8],
    page_count: usize,
) -> Result<String, ProcessError> {
    let mut all_text = String::new();
    let mut recognized_pages = 0usize;
    let mut first_error: Option<ProcessError> = None;

    for page_num in 1..=page_count {
        let page_text = render_pdf_page_to_image(pdf_bytes, page_num as u32, engine.dpi())
            .and_then(|image_data| engine.recognize_image_bytes(&image_data));
        match page_text {
            Ok(page_text) => {
                if !all_text.is_empty() {
                    all_text.push(PAGE_BREAK);
                }
                all_text.push_str(&page_text);
                recognized_pages += 1;
            }
            Err(e) => {
                tracing::warn!("Page {} of {} failed OCR: {}", page_num, page_count, e);
                first_error.get_or_insert(e);
            }
        }
    }

    // A single bad page is tolerated; a document where no page could be
    // recognized surfaces the engine failure.
    if recognized_pages == 0 {
        if let Some(e) = first_error {
            return Err(e);
        }
    }

    Ok(all_text)
}

/// Minimum characters before the alphanumeric ratio check applies; shorter
/// text passes regardless of composition.
const MIN_TOTAL_CHARS: usize = 50;

/// Minimum percentage of alphanumeric characters for a text layer to count
/// as usable.
const MIN_ALPHANUMERIC_PERCENT: usize = 10;

/// Marker lopdf emits for CID fonts it cannot decode.
const IDENTITY_H_PATTERN: &str = "?Identity-H Unimplemented?";

/// Whether the extracted text layer is unusable and the pages should be
/// rendered and recognized instead.
fn should_use_ocr(text: &str) -> bool {
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return true;
    }

    // A text layer that is nothing but font-decode markers is unusable.
    let cleaned = trimmed
        .replace(IDENTITY_H_PATTERN, "")
        .replace(['\n', ' ', PAGE_BREAK], "");
    if cleaned.is_empty() {
        return true;
    }

    // Mostly non-alphanumeric output means the encoding came out garbled.
    let total_chars = trimmed.chars().count();
    let alphanumeric_chars = trimmed.chars().filter(|c| c.is_alphanumeric()).count();
    total_chars > MIN_TOTAL_CHARS
        && alphanumeric_chars * 100 < total_chars * MIN_ALPHANUMERIC_PERCENT
}

/// Page count via pdfinfo, for PDFs lopdf cannot parse.
fn count_pdf_pages(pdf_bytes: &[u8]) -> Result<usize, ProcessError> {
    let temp_dir = std::env::temp_dir();
    let pdf_path = temp_dir.join(format!("scandex_pagecount_{}.pdf", uuid::Uuid::new_v4()));

    std::fs::write(&pdf_path, pdf_bytes)
        .map_err(|e| ProcessError::Engine(format!("Failed to write temp PDF: {}", e)))?;

    let output = Command::new("pdfinfo").arg(&pdf_path).output().map_err(|e| {
        let _ = std::fs::remove_file(&pdf_path);
        ProcessError::Engine(format!(
            "Failed to run pdfinfo: {}. Make sure poppler-utils is installed.",
            e
        ))
    })?;

    let _ = std::fs::remove_file(&pdf_path);

    if !output.status.success() {
        return Err(ProcessError::Engine(format!(
            "pdfinfo failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines() {
        if let Some(count_str) = line.strip_prefix("Pages:") {
            if let Ok(count) = count_str.trim().parse::<usize>() {
                return Ok(count);
            }
        }
    }

    // pdfinfo ran but did not report a count; treat as single page.
    Ok(1)
}

/// Renders one page to a PNG via pdftoppm at the given DPI.
fn render_pdf_page_to_image(
    pdf_bytes: &[u8],
    page_num: u32,
    dpi: u32,
) -> Result<Vec<u8>, ProcessError> {
    let temp_dir = std::env::temp_dir();
    let pdf_path = temp_dir.join(format!("scandex_render_{}.pdf", uuid::Uuid::new_v4()));
    let output_prefix = temp_dir.join(format!("scandex_page_{}", uuid::Uuid::new_v4()));

    std::fs::write(&pdf_path, pdf_bytes)
        .map_err(|e| ProcessError::Engine(format!("Failed to write temp PDF: {}", e)))?;

    let output = Command::new("pdftoppm")
        .args([
            "-png",
            "-r",
            &dpi.to_string(),
            "-f",
            &page_num.to_string(),
            "-l",
            &page_num.to_string(),
        ])
        .arg(&pdf_path)
        .arg(&output_prefix)
        .output()
        .map_err(|e| {
            let _ = std::fs::remove_file(&pdf_path);
            ProcessError::Engine(format!(
                "Failed to run pdftoppm: {}. Make sure poppler-utils is installed.",
                e
            ))
        })?;

    let _ = std::fs::remove_file(&pdf_path);

    if !output.status.success() {
        return Err(ProcessError::Engine(format!(
            "pdftoppm failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    // pdftoppm pads the page suffix depending on the document's page count.
    let candidates = [
        format!("{}-{}.png", output_prefix.display(), page_num),
        format!("{}-{:02}.png", output_prefix.display(), page_num),
        format!("{}-{:03}.png", output_prefix.display(), page_num),
    ];
    let image_path = candidates
        .iter()
        .find(|p| Path::new(p).exists())
        .ok_or_else(|| ProcessError::Engine("Failed to find rendered page image".to_string()))?;

    let image_data = std::fs::read(image_path)
        .map_err(|e| ProcessError::Engine(format!("Failed to read rendered image: {}", e)))?;

    let _ = std::fs::remove_file(image_path);

    Ok(image_data)
}
