//! Local OCR: transcribe rasterised pages with an on-device engine.
//!
//! Each page becomes a `# PÁGINA N` section. Blank pages are tagged
//! `(VAZIA)`; a page the engine chokes on gets an error heading and the loop
//! moves on. Only a missing engine binary ends the attempt, since every
//! following page would fail the same way.

use crate::cascade::Stage;
use crate::config::ConversionConfig;
use crate::error::{AttemptError, OcrError, PageError};
use crate::output::{DocumentResult, PageResult, PageStatus};
use crate::pipeline::render::PageImage;
use crate::progress::ProgressCallback;
use async_trait::async_trait;
use image::DynamicImage;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// An OCR engine: image + language in, plain text out.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &DynamicImage, language: &str) -> Result<String, OcrError>;
}

/// The `tesseract` command-line tool.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    cmd: PathBuf,
}

impl TesseractEngine {
    pub fn new(cmd: impl Into<PathBuf>) -> Self {
        Self { cmd: cmd.into() }
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn recognize(&self, image: &DynamicImage, language: &str) -> Result<String, OcrError> {
        let input = tempfile::Builder::new()
            .prefix("doc2md-ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| OcrError::Recognition(format!("temp file: {e}")))?;
        image
            .save_with_format(input.path(), image::ImageFormat::Png)
            .map_err(|e| OcrError::Recognition(format!("encode page: {e}")))?;

        let output = tokio::process::Command::new(&self.cmd)
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => OcrError::EngineNotFound(self.cmd.display().to_string()),
                _ => OcrError::Recognition(format!("failed to run {}: {e}", self.cmd.display())),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Recognition(format!(
                "{} exited with {}: {}",
                self.cmd.display(),
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// OCR every page. Fails only when the engine is missing.
pub async fn run_local_ocr(
    engine: &dyn OcrEngine,
    pages: &[PageImage],
    config: &ConversionConfig,
    progress: Option<&ProgressCallback>,
) -> Result<DocumentResult, AttemptError> {
    let total = pages.len();
    let timeout = Duration::from_secs(config.ocr_timeout_secs);
    info!("Local OCR: {} pages, language '{}'", total, config.ocr_language);
    if let Some(cb) = progress {
        cb.on_pages_start(Stage::LocalOcr, total);
    }

    let mut results = Vec::with_capacity(total);
    for page in pages {
        let n = page.page_num;
        let start = Instant::now();

        let result = match &page.image {
            Err(detail) => PageResult::failed(
                n,
                PageError::RenderFailed {
                    page: n,
                    detail: detail.clone(),
                },
            ),
            Ok(img) => match tokio::time::timeout(timeout, engine.recognize(img, &config.ocr_language)).await {
                Err(_) => PageResult::failed(
                    n,
                    PageError::OcrFailed {
                        page: n,
                        detail: format!("timed out after {}s", config.ocr_timeout_secs),
                    },
                ),
                Ok(Err(OcrError::EngineNotFound(cmd))) => {
                    warn!("OCR engine '{}' not found; abandoning local OCR", cmd);
                    return Err(AttemptError::EngineNotFound(cmd));
                }
                Ok(Err(OcrError::Recognition(detail))) => {
                    PageResult::failed(n, PageError::OcrFailed { page: n, detail })
                }
                Ok(Ok(text)) if text.trim().is_empty() => PageResult::empty(n),
                Ok(Ok(text)) => PageResult::ok(n, text.trim()),
            },
        }
        .with_timing(start.elapsed().as_millis() as u64, 0);

        match (&result.status, &result.error) {
            (PageStatus::ExtractionError, Some(e)) => {
                warn!("{}", e);
                if let Some(cb) = progress {
                    cb.on_page_error(n, total, &e.to_string());
                }
            }
            (status, _) => {
                debug!("Page {}/{}: {:?}", n, total, status);
                if let Some(cb) = progress {
                    cb.on_page_complete(n, total, *status);
                }
            }
        }
        results.push(result);
    }

    let doc = DocumentResult::from_pages(results, config.write_bom);
    info!(
        "Local OCR finished: {} ok, {} empty, {} failed",
        doc.count(PageStatus::Ok),
        doc.count(PageStatus::Empty),
        doc.count(PageStatus::ExtractionError)
    );
    Ok(doc)
}
