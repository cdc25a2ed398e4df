//! Document text extraction with OCR fallback.
//!
//! Direct extraction runs first. Only when a PDF yields no text does the
//! [`Extractor`] hand the file to an [`OcrEngine`], which writes a rendition
//! with a text layer, and then extracts again from that rendition. Digital
//! PDFs never pay the OCR cost.
//!
//! Extraction never fails outright. A corrupt file, a parser panic, or an OCR
//! failure all end in [`ExtractionMethod::Unreadable`], which the ingestion
//! pipeline reports as "no readable text".

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{ExtractedText, ExtractionMethod};

/// Kinds of documents the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    /// Plain text or Markdown, read as UTF-8 and never OCR'd.
    Text,
}

/// Classify a path by extension (case-insensitive).
pub fn document_kind(path: &Path) -> Option<DocumentKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(DocumentKind::Pdf),
        "txt" | "md" | "markdown" => Some(DocumentKind::Text),
        _ => None,
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported document type: {0}")]
    Unsupported(String),
    #[error("cannot read document: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Extract text directly from a file, without OCR.
pub fn extract_direct(path: &Path) -> Result<String, ExtractError> {
    match document_kind(path) {
        Some(DocumentKind::Pdf) => {
            let bytes = std::fs::read(path)?;
            pdf_extract::extract_text_from_mem(&bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
        }
        Some(DocumentKind::Text) => {
            let bytes = std::fs::read(path)?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        None => Err(ExtractError::Unsupported(path.display().to_string())),
    }
}

/// Renders a scanned document into one with selectable text.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize `input` and write a text-bearing PDF to `output`.
    async fn recognize(&self, input: &Path, output: &Path) -> Result<()>;
}

/// OCR via the `ocrmypdf` command-line tool (Tesseract under the hood).
///
/// Runs with skew correction and skips pages that already carry text.
pub struct OcrMyPdf {
    command: String,
}

impl OcrMyPdf {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for OcrMyPdf {
    fn default() -> Self {
        Self::new("ocrmypdf")
    }
}

#[async_trait]
impl OcrEngine for OcrMyPdf {
    async fn recognize(&self, input: &Path, output: &Path) -> Result<()> {
        let result = tokio::process::Command::new(&self.command)
            .arg("--deskew")
            .arg("--skip-text")
            .arg("--quiet")
            .arg(input)
            .arg(output)
            .output()
            .await;

        let out = match result {
            Ok(out) => out,
            Err(e) => bail!("failed to run {}: {}", self.command, e),
        };
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            bail!("{} exited with {}: {}", self.command, out.status, stderr.trim());
        }
        Ok(())
    }
}

/// Two-tier text extractor: direct first, OCR only when that yields nothing.
pub struct Extractor {
    ocr: Option<Arc<dyn OcrEngine>>,
    scratch_dir: PathBuf,
}

impl Extractor {
    /// `ocr = None` disables the fallback.
    pub fn new(ocr: Option<Arc<dyn OcrEngine>>) -> Self {
        Self {
            ocr,
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Directory for OCR renditions (defaults to the system temp dir).
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub async fn extract(&self, path: &Path) -> ExtractedText {
        let Some(kind) = document_kind(path) else {
            warn!(path = %path.display(), "unsupported document type");
            return ExtractedText::unreadable();
        };

        let direct = read_text(path).await;
        if !direct.trim().is_empty() {
            return ExtractedText {
                text: direct.trim().to_string(),
                method: ExtractionMethod::Direct,
            };
        }

        if kind != DocumentKind::Pdf {
            return ExtractedText::unreadable();
        }
        let Some(ocr) = &self.ocr else {
            debug!(path = %path.display(), "no text and OCR disabled");
            return ExtractedText::unreadable();
        };

        let name = display_name(path);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let rendition = self
            .scratch_dir
            .join(format!("ocr_{}-{}.pdf", stem, Uuid::new_v4()));

        info!(file = %name, "running OCR (scanned or image-only PDF)");
        let started = Instant::now();
        if let Err(e) = ocr.recognize(path, &rendition).await {
            warn!(file = %name, error = %e, "OCR failed");
            let _ = std::fs::remove_file(&rendition);
            return ExtractedText::unreadable();
        }
        info!(
            file = %name,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "OCR complete"
        );

        let text = read_text(&rendition).await;
        let _ = std::fs::remove_file(&rendition);

        if text.trim().is_empty() {
            ExtractedText::unreadable()
        } else {
            ExtractedText {
                text: text.trim().to_string(),
                method: ExtractionMethod::Ocr,
            }
        }
    }
}

/// Direct extraction on the blocking pool. Errors and parser panics become
/// an empty string.
async fn read_text(path: &Path) -> String {
    let owned = path.to_path_buf();
    match tokio::task::spawn_blocking(move || extract_direct(&owned)).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            warn!(path = %path.display(), error = %e, "text extraction failed");
            String::new()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "text extraction panicked");
            String::new()
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
