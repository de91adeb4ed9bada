//! Production text engine backed by Tesseract.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use crate::error::ProcessError;
use crate::processor::{pdf, require_text, DocumentKind, TextEngine};

/// Recognizes text in images and rendered PDF pages via the Tesseract C
/// API. Cheap to clone — settings live behind an `Arc` so every worker can
/// hold the same engine.
#[derive(Clone)]
pub struct TesseractEngine {
    inner: Arc<TesseractEngineInner>,
}

struct TesseractEngineInner {
    languages: String,
    dpi: u32,
}

impl TesseractEngine {
    pub fn new(languages: &[String], dpi: u32) -> Self {
        let lang_str = if languages.is_empty() {
            "eng".to_string()
        } else {
            languages.join("+")
        };

        Self {
            inner: Arc::new(TesseractEngineInner {
                languages: lang_str,
                dpi,
            }),
        }
    }

    pub fn dpi(&self) -> u32 {
        self.inner.dpi
    }

    pub fn recognize_image(&self, image_path: &Path) -> Result<String, ProcessError> {
        self.recognize_image_bytes(&std::fs::read(image_path).map_err(|e| {
            ProcessError::ReadDocument {
                path: image_path.to_path_buf(),
                source: e,
            }
        })?)
    }

    pub fn recognize_image_bytes(&self, image_data: &[u8]) -> Result<String, ProcessError> {
        let _span = tracing::info_span!("engine.recognize").entered();

        let img = image::load_from_memory(image_data)
            .map_err(|e| ProcessError::Engine(format!("Failed to load image: {}", e)))?;

        // leptess wants a self-contained buffer; normalize to PNG in memory.
        let mut png_data = Vec::new();
        let mut cursor = Cursor::new(&mut png_data);
        img.write_to(&mut cursor, image::ImageFormat::Png)
            .map_err(|e| ProcessError::Engine(format!("Failed to convert image: {}", e)))?;

        let mut lt = leptess::LepTess::new(None, &self.inner.languages)
            .map_err(|e| ProcessError::Engine(format!("Failed to initialize Tesseract: {}", e)))?;

        lt.set_image_from_mem(&png_data)
            .map_err(|e| ProcessError::Engine(format!("Failed to set image for OCR: {}", e)))?;

        let text = lt
            .get_utf8_text()
            .map_err(|e| ProcessError::Engine(format!("OCR failed: {}", e)))?;

        Ok(text)
    }
}

impl TextEngine for TesseractEngine {
    fn extract_text(&self, path: &Path) -> Result<String, ProcessError> {
        let kind = DocumentKind::from_path(path).ok_or_else(|| {
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            ProcessError::UnsupportedFormat(ext.to_string())
        })?;

        let text = match kind {
            DocumentKind::Image => self.recognize_image(path)?,
            DocumentKind::Pdf => pdf::extract_pdf_text(self, path)?,
        };

        require_text(text)
    }
}
