//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to follow a
//! document through the cascade: which stage is running, and how each page of
//! an OCR or cloud pass turned out.
//!
//! # Example
//!
//! ```rust
//! use edgequake_doc2md::{ConversionConfig, ConversionProgressCallback, Stage};
//! use std::sync::Arc;
//!
//! struct StageLogger;
//!
//! impl ConversionProgressCallback for StageLogger {
//!     fn on_stage(&self, stage: Stage) {
//!         eprintln!("entering {stage}");
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(StageLogger))
//!     .build()
//!     .unwrap();
//! ```

use crate::cascade::Stage;
use crate::output::PageStatus;
use std::path::Path;
use std::sync::Arc;

/// Called by the pipeline as it moves through stages and pages.
///
/// All methods default to no-ops. With `concurrency > 1` the page methods of a
/// cloud pass may be called from several tasks at once, so implementations
/// must synchronise shared state.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once per document before triage.
    fn on_document_start(&self, input: &Path) {
        let _ = input;
    }

    /// Called on entry to each extraction stage.
    fn on_stage(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called once the page count of an OCR or cloud pass is known.
    fn on_pages_start(&self, stage: Stage, total_pages: usize) {
        let _ = (stage, total_pages);
    }

    /// Called when a page produced content or was tagged empty.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, status: PageStatus) {
        let _ = (page_num, total_pages, status);
    }

    /// Called when a page was replaced by an error placeholder.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once per document after the cascade has finished.
    fn on_document_complete(&self, input: &Path, success: bool) {
        let _ = (input, success);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
