//! Digital-vs-scanned triage for PDFs.
//!
//! A page "has text" when its trimmed text layer holds at least
//! `min_text_chars` characters. The document is digital when the share of such
//! pages reaches `digital_threshold`. Anything that prevents reading the text
//! layer classifies as scanned: the OCR branch can cope with either kind, the
//! structured branch cannot cope with image-only pages.

use crate::config::ConversionConfig;
use crate::pipeline::render;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// Whether a PDF carries an extractable text layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    Digital,
    Scanned,
}

/// Classifier output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub kind: DocumentKind,
    /// `pages_with_text / total_pages`, 0.0 for an empty document.
    pub ratio: f32,
    pub pages_with_text: usize,
    pub total_pages: usize,
}

impl Verdict {
    pub fn is_digital(&self) -> bool {
        self.kind == DocumentKind::Digital
    }

    fn scanned_unreadable() -> Self {
        Self {
            kind: DocumentKind::Scanned,
            ratio: 0.0,
            pages_with_text: 0,
            total_pages: 0,
        }
    }
}

/// Classify from already-extracted page texts.
pub fn classify_texts(texts: &[String], min_chars: usize, threshold: f32) -> Verdict {
    let total_pages = texts.len();
    let pages_with_text = texts
        .iter()
        .filter(|t| t.trim().chars().count() >= min_chars)
        .count();

    if total_pages == 0 {
        return Verdict::scanned_unreadable();
    }

    let ratio = pages_with_text as f32 / total_pages as f32;
    let kind = if ratio >= threshold {
        DocumentKind::Digital
    } else {
        DocumentKind::Scanned
    };

    Verdict {
        kind,
        ratio,
        pages_with_text,
        total_pages,
    }
}

/// Classify the PDF at `path`. Never fails: read errors yield `Scanned`.
pub async fn classify(path: &Path, config: &ConversionConfig) -> Verdict {
    let backend = render::backend_for(config);
    let texts = match render::page_texts(backend, path, config.password.clone()).await {
        Ok(texts) => texts,
        Err(e) => {
            warn!("Could not read text layer of {}: {} (treating as scanned)", path.display(), e);
            return Verdict::scanned_unreadable();
        }
    };

    let verdict = classify_texts(&texts, config.min_text_chars, config.digital_threshold);
    debug!(
        "{} of {} pages carry ≥{} chars",
        verdict.pages_with_text, verdict.total_pages, config.min_text_chars
    );
    info!(
        "Classified {} as {:?} (ratio {:.2})",
        path.display(),
        verdict.kind,
        verdict.ratio
    );
    verdict
}
