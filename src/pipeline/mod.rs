//! Extraction stages used by the cascade.
//!
//! Each submodule is one capability the orchestrator can call on:
//!
//! ```text
//!            ┌─▶ classify ─────────────────────────────┐
//! render ────┤                                         │
//!  (pdfium)  ├─▶ ocr (tesseract) ──────────────────────┤
//!            └─▶ encode ─▶ vision ─▶ postprocess       │──▶ output
//!                          (cloud, per page, retried)   │
//! docx ─▶ structured (markitdown, PDF text fallback) ───┤
//! transcript (video URLs) ──────────────────────────────┘
//! ```
//!
//! 1. [`render`]: rasterise pages and read the PDF text layer on the blocking pool
//! 2. [`classify`]: digital-vs-scanned verdict from the text layer
//! 3. [`ocr`]: local OCR, one `# PÁGINA N` section per page
//! 4. [`encode`] / [`vision`] / [`cloud`]: cloud structuring with retry and
//!    bounded concurrency
//! 5. [`postprocess`]: response-fence grammar and deterministic cleanup
//! 6. [`docx`] / [`structured`]: converter path for documents with their own text
//! 7. [`transcript`]: caption tracks for video URLs, no triage

pub mod classify;
pub mod cloud;
pub mod docx;
pub mod encode;
pub mod ocr;
pub mod postprocess;
pub mod render;
pub mod structured;
pub mod transcript;
pub mod vision;
