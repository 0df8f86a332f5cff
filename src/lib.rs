//! # edgequake-doc2md
//!
//! Convert PDFs, office documents, images and audio to Markdown, choosing the
//! cheapest extractor that works and falling back when it doesn't.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input
//!  │
//!  ├─ YouTube URL ─────────▶ caption transcript
//!  │
//!  ├─ non-PDF ─────────────▶ structured converter (markitdown)
//!  │
//!  └─ PDF ─▶ classify text layer
//!             ├─ digital ──▶ structured converter ─▶ PDF text fallback
//!             └─ scanned ──▶ local OCR (tesseract)
//!                             ├─ ok ─────────────▶ done, or cloud upgrade if forced
//!                             └─ failed ─────────▶ cloud structuring (Gemini / edgequake-llm)
//! ```
//!
//! OCR and cloud output is one `# PÁGINA N` section per page. Blank pages and
//! failed pages keep their slot with a `(VAZIA)` tag or an error heading, so
//! the page count always matches the source.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_doc2md::{process, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .credential(std::env::var("GEMINI_API_KEY")?)
//!         .build()?;
//!     let report = process("scan.pdf", "scan.md", &config).await?;
//!     eprintln!("{:?}: {} pages, {} failed", report.strategy, report.total_pages, report.failed_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doc2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## External tools
//!
//! | Capability | Default | Override |
//! |------------|---------|----------|
//! | PDF rendering / text | pdfium shared library | `PDFIUM_LIB_PATH`, [`ConversionConfig::pdf_backend`] |
//! | Local OCR | `tesseract` on `PATH` | [`ConversionConfig::tesseract_cmd`], [`ConversionConfig::ocr_engine`] |
//! | Structured conversion | `markitdown` on `PATH` | [`ConversionConfig::converter_cmd`], [`ConversionConfig::converter`] |
//! | Cloud structuring | Gemini REST with an API key | [`ConversionConfig::provider_name`], [`ConversionConfig::vision_backend`] |
//! | Video transcripts | YouTube watch page and timedtext API | [`ConversionConfig::transcript_source`] |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cascade;
pub mod config;
pub mod convert;
pub mod error;
pub mod format;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cascade::Stage;
pub use config::{ConversionConfig, ConversionConfigBuilder, DEFAULT_CLOUD_MODEL};
pub use convert::{classify_document, process, process_sync};
pub use error::{AttemptError, Doc2MdError, PageError, TranscriptError};
pub use format::DocumentFormat;
pub use output::{
    default_output_path, AttemptRecord, DocumentResult, PageResult, PageStatus, PipelineReport,
    Strategy,
};
pub use pipeline::classify::{DocumentKind, Verdict};
pub use pipeline::transcript::{TranscriptSource, TranscriptTrack};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
