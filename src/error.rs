//! Error types for the edgequake-doc2md library.
//!
//! Three tiers mirror the three failure scopes of the extraction cascade:
//!
//! * [`Doc2MdError`] (**Document-scoped**): the document cannot be converted
//!   at all (unsupported format, every cascade branch exhausted, output not
//!   writable). Returned as `Err(Doc2MdError)` from [`crate::convert::process`]
//!   and no output file is left behind.
//!
//! * [`AttemptError`] (**Fatal to one attempt**): a single extraction strategy
//!   gave up (no renderable pages, OCR engine missing, converter crashed).
//!   The orchestrator turns it into a diagnostic and moves to the next branch.
//!
//! * [`PageError`] (**Page-scoped**): one page failed (empty cloud response,
//!   API error, timeout) while the rest of the document carries on. Stored in
//!   [`crate::output::PageResult`].
//!
//! The collaborator errors ([`BackendError`], [`OcrError`], [`ConverterError`],
//! [`TranscriptError`])
//! are what the external capabilities report; the extractors map them onto the
//! tiers above.

use std::path::PathBuf;
use thiserror::Error;

/// Document-scoped terminal failures.
#[derive(Debug, Error)]
pub enum Doc2MdError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The file extension is not handled by any extraction strategy.
    #[error("Unsupported format '{extension}' for '{path}'")]
    UnsupportedFormat { path: PathBuf, extension: String },

    // ── Cascade errors ────────────────────────────────────────────────────
    /// Structured extraction failed and no fallback applies to this format.
    #[error("Structured extraction failed for '{path}': {detail}")]
    StructuredExtractionFailed { path: PathBuf, detail: String },

    /// Local OCR failed and no cloud credential is available for the fallback.
    #[error("Local OCR failed for '{path}' and no cloud credential is available: {detail}")]
    NoCloudFallback { path: PathBuf, detail: String },

    /// No transcript could be obtained for a web video.
    #[error("No transcript available for '{url}': {detail}")]
    TranscriptUnavailable { url: String, detail: String },

    /// Every branch of the cascade was tried without producing content.
    #[error("All extraction strategies failed for '{path}':\n{summary}")]
    CascadeExhausted { path: PathBuf, summary: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failure that ends one extraction attempt but not the cascade.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttemptError {
    /// The document could not be opened or rendered to any page.
    #[error("rasterisation failed: {0}")]
    RasterisationFailed(String),

    /// The OCR engine binary could not be located.
    #[error("OCR engine not found: {0}")]
    EngineNotFound(String),

    /// The structured converter failed and no fallback produced output.
    #[error("structured conversion failed: {0}")]
    ConverterFailed(String),

    /// Every page of a cloud run failed; nothing worth writing.
    #[error("all {total} pages failed in the cloud backend (first error: {first_error})")]
    NoUsablePages { total: usize, first_error: String },

    /// No cloud backend is configured for this run.
    #[error("no cloud backend available")]
    BackendUnavailable,

    /// Neither listing nor direct fetches produced a transcript.
    #[error("transcript extraction failed: {0}")]
    TranscriptFailed(String),
}

/// A non-fatal error for a single page.
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The page could not be rasterised.
    #[error("Page {page}: rendering failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The OCR engine raised for this page.
    #[error("Page {page}: OCR failed: {detail}")]
    OcrFailed { page: usize, detail: String },

    /// The cloud backend raised for this page after all retries.
    #[error("Page {page}: API call failed after {retries} retries: {detail}")]
    ApiFailed {
        page: usize,
        retries: u32,
        detail: String,
    },

    /// The cloud backend answered but nothing was left after fence stripping.
    #[error("Page {page}: empty response")]
    EmptyResponse { page: usize },
}

/// Errors reported by a generative-AI backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Credential rejected (401/403) or model listing refused.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Request failed in transport or returned a non-success status.
    #[error("request failed: {0}")]
    Request(String),

    /// The backend refused to answer (content policy, safety filter).
    #[error("response blocked: {0}")]
    Blocked(String),

    /// The per-call timeout elapsed.
    #[error("timed out after {0}s")]
    Timeout(u64),
}

/// Errors reported by an OCR engine.
#[derive(Debug, Clone, Error)]
pub enum OcrError {
    /// Engine binary missing; fatal to the whole OCR attempt.
    #[error("engine not found: {0}")]
    EngineNotFound(String),

    /// Engine ran but failed on this image; page-scoped.
    #[error("{0}")]
    Recognition(String),
}

/// Errors reported by a video transcript source.
#[derive(Debug, Clone, Error)]
pub enum TranscriptError {
    /// The URL carries no recognisable video ID.
    #[error("no video ID in '{0}'")]
    InvalidUrl(String),

    /// The video has no transcript in the requested languages.
    #[error("no transcript found: {0}")]
    NotFound(String),

    /// Transport failure or unexpected response.
    #[error("request failed: {0}")]
    Request(String),

    /// The source did not answer in time.
    #[error("timed out after {0}s")]
    Timeout(u64),
}

/// Errors reported by the structured-document converter.
#[derive(Debug, Clone, Error)]
pub enum ConverterError {
    /// The converter tool is not installed.
    #[error("converter not found: {0}")]
    NotFound(String),

    /// The converter ran and failed.
    #[error("conversion failed: {0}")]
    Failed(String),

    /// The converter did not finish in time.
    #[error("conversion timed out after {0}s")]
    Timeout(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_display() {
        let e = Doc2MdError::UnsupportedFormat {
            path: PathBuf::from("notes.xyz"),
            extension: "xyz".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("xyz"), "got: {msg}");
        assert!(msg.contains("notes.xyz"), "got: {msg}");
    }

    #[test]
    fn cascade_exhausted_lists_summary() {
        let e = Doc2MdError::CascadeExhausted {
            path: PathBuf::from("scan.pdf"),
            summary: "local-ocr: OCR engine not found\ncloud-fallback: no cloud backend".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("local-ocr"));
        assert!(msg.contains("cloud-fallback"));
    }

    #[test]
    fn no_usable_pages_display() {
        let e = AttemptError::NoUsablePages {
            total: 4,
            first_error: "quota".into(),
        };
        assert!(e.to_string().contains("all 4 pages"));
        assert!(e.to_string().contains("quota"));
    }

    #[test]
    fn page_error_display() {
        let e = PageError::ApiFailed {
            page: 7,
            retries: 1,
            detail: "content blocked".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("Page 7"));
        assert!(msg.contains("content blocked"));
    }

    #[test]
    fn backend_timeout_display() {
        assert_eq!(BackendError::Timeout(120).to_string(), "timed out after 120s");
    }
}
