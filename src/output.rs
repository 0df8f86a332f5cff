//! Output types: per-page results, the assembled document, and the run report.
//!
//! Page sections use fixed Portuguese headings (`# PÁGINA N`, `# PÁGINA N
//! (VAZIA)`, `# ERRO DE API NA PÁGINA N: …`) so downstream tooling can split
//! a document back into pages without knowing which extractor produced it.

use crate::cascade::Stage;
use crate::error::{Doc2MdError, PageError};
use crate::format::DocumentFormat;
use crate::pipeline::classify::Verdict;
use crate::pipeline::transcript::{extract_video_id, is_youtube_url};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Byte-order mark prefixed to OCR output for viewers that sniff encodings.
pub const UTF8_BOM: &str = "\u{FEFF}";

/// Outcome of one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageStatus {
    Ok,
    Empty,
    ExtractionError,
}

/// The text produced for one page, tagged with its 1-based number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    pub page_num: usize,
    pub status: PageStatus,
    /// Page body without the heading. Empty unless `status == Ok`.
    pub markdown: String,
    pub duration_ms: u64,
    pub retries: u32,
    pub error: Option<PageError>,
}

impl PageResult {
    pub fn ok(page_num: usize, markdown: impl Into<String>) -> Self {
        Self {
            page_num,
            status: PageStatus::Ok,
            markdown: markdown.into(),
            duration_ms: 0,
            retries: 0,
            error: None,
        }
    }

    pub fn empty(page_num: usize) -> Self {
        Self {
            page_num,
            status: PageStatus::Empty,
            markdown: String::new(),
            duration_ms: 0,
            retries: 0,
            error: None,
        }
    }

    pub fn failed(page_num: usize, error: PageError) -> Self {
        Self {
            page_num,
            status: PageStatus::ExtractionError,
            markdown: String::new(),
            duration_ms: 0,
            retries: 0,
            error: Some(error),
        }
    }

    pub fn with_timing(mut self, duration_ms: u64, retries: u32) -> Self {
        self.duration_ms = duration_ms;
        self.retries = retries;
        self
    }

    /// Render this page as a Markdown section, heading included.
    pub fn section(&self) -> String {
        let n = self.page_num;
        match (self.status, &self.error) {
            (PageStatus::Ok, _) => format!("\n\n# PÁGINA {n}\n\n{}", self.markdown.trim()),
            (PageStatus::Empty, _) => format!("\n\n# PÁGINA {n} (VAZIA)\n\n"),
            (PageStatus::ExtractionError, Some(PageError::ApiFailed { detail, .. })) => {
                format!("\n\n# ERRO DE API NA PÁGINA {n}: {}\n\n", one_line(detail))
            }
            (PageStatus::ExtractionError, Some(PageError::OcrFailed { detail, .. })) => {
                format!("\n\n# ERRO DE OCR NA PÁGINA {n}: {}\n\n", one_line(detail))
            }
            (PageStatus::ExtractionError, Some(PageError::RenderFailed { detail, .. })) => {
                format!("\n\n# ERRO DE RENDERIZAÇÃO NA PÁGINA {n}: {}\n\n", one_line(detail))
            }
            (PageStatus::ExtractionError, _) => format!("\n\n# ERRO DE EXTRAÇÃO NA PÁGINA {n}\n\n"),
        }
    }
}

/// Collapse a diagnostic onto one line so it cannot break the heading.
fn one_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A fully assembled document, ready to be written once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResult {
    /// Per-page results in page order. Empty for verbatim converter output.
    pub pages: Vec<PageResult>,
    pub markdown: String,
    /// Prefix the file with a UTF-8 byte-order mark.
    pub bom: bool,
}

impl DocumentResult {
    /// Assemble page sections in ascending page order.
    pub fn from_pages(mut pages: Vec<PageResult>, bom: bool) -> Self {
        pages.sort_by_key(|p| p.page_num);
        let markdown = pages
            .iter()
            .map(PageResult::section)
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            pages,
            markdown,
            bom,
        }
    }

    /// Wrap converter output that is written as-is.
    pub fn verbatim(markdown: impl Into<String>) -> Self {
        Self {
            pages: Vec::new(),
            markdown: markdown.into(),
            bom: false,
        }
    }

    pub fn count(&self, status: PageStatus) -> usize {
        self.pages.iter().filter(|p| p.status == status).count()
    }

    /// Bytes exactly as they will land on disk.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::with_capacity(self.markdown.len() + 3);
        if self.bom {
            out.push_str(UTF8_BOM);
        }
        out.push_str(&self.markdown);
        out.into_bytes()
    }
}

/// Write `doc` to `path`, replacing any existing file.
///
/// Uses temp file + rename so a crash never leaves a half-written artifact.
pub async fn write_document(path: &Path, doc: &DocumentResult) -> Result<(), Doc2MdError> {
    let fail = |source| Doc2MdError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(fail)?;
        }
    }

    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, doc.to_bytes()).await.map_err(fail)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(fail(e));
    }

    debug!("Wrote {} bytes to {}", doc.markdown.len(), path.display());
    Ok(())
}

/// `<input dir>/markdown_output/<stem>_output.md`.
///
/// A video URL has no directory; its transcript goes to
/// `markdown_output/youtube_<id>_output.md` under the working directory.
pub fn default_output_path(input: &Path) -> PathBuf {
    if let Some(id) = input
        .to_str()
        .filter(|s| is_youtube_url(s))
        .and_then(extract_video_id)
    {
        return Path::new("markdown_output").join(format!("youtube_{id}_output.md"));
    }
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    input
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join("markdown_output")
        .join(format!("{stem}_output.md"))
}

// ── Run report ───────────────────────────────────────────────────────────

/// Which extractor produced the written artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Structured converter output, written verbatim.
    Structured,
    /// Per-page plain-text recovery for a PDF the converter choked on.
    PdfTextFallback,
    LocalOcr,
    Cloud,
    /// Caption transcript of a video URL.
    Transcript,
}

/// One extraction attempt, for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub stage: Stage,
    pub succeeded: bool,
    pub detail: Option<String>,
    pub duration_ms: u64,
}

/// Summary of a successful pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub format: DocumentFormat,
    /// Present only for formats that went through triage.
    pub verdict: Option<Verdict>,
    pub strategy: Strategy,
    pub attempts: Vec<AttemptRecord>,
    /// Whether a cloud backend passed its credential check for this run.
    pub cloud_available: bool,
    pub total_pages: usize,
    pub empty_pages: usize,
    pub failed_pages: usize,
    pub total_duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_use_page_headings() {
        assert_eq!(PageResult::ok(1, "Olá\n").section(), "\n\n# PÁGINA 1\n\nOlá");
        assert_eq!(PageResult::empty(2).section(), "\n\n# PÁGINA 2 (VAZIA)\n\n");
        assert_eq!(
            PageResult::failed(3, PageError::EmptyResponse { page: 3 }).section(),
            "\n\n# ERRO DE EXTRAÇÃO NA PÁGINA 3\n\n"
        );
    }

    #[test]
    fn api_error_detail_is_flattened() {
        let page = PageResult::failed(
            4,
            PageError::ApiFailed {
                page: 4,
                retries: 0,
                detail: "quota\nexceeded".into(),
            },
        );
        assert_eq!(page.section(), "\n\n# ERRO DE API NA PÁGINA 4: quota exceeded\n\n");
    }

    #[test]
    fn from_pages_sorts_and_joins() {
        let doc = DocumentResult::from_pages(
            vec![PageResult::ok(2, "b"), PageResult::ok(1, "a")],
            true,
        );
        assert_eq!(doc.markdown, "\n\n# PÁGINA 1\n\na\n\n\n# PÁGINA 2\n\nb");
        assert_eq!(doc.pages[0].page_num, 1);
        assert!(doc.to_bytes().starts_with(UTF8_BOM.as_bytes()));
    }

    #[test]
    fn verbatim_has_no_bom() {
        let doc = DocumentResult::verbatim("# Title\n");
        assert_eq!(doc.to_bytes(), b"# Title\n");
        assert!(doc.pages.is_empty());
    }

    #[test]
    fn default_output_path_layout() {
        let p = default_output_path(Path::new("/data/in/contrato.pdf"));
        assert_eq!(p, PathBuf::from("/data/in/markdown_output/contrato_output.md"));
    }

    #[test]
    fn video_url_output_is_named_after_the_video() {
        let p = default_output_path(Path::new("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert_eq!(p, PathBuf::from("markdown_output/youtube_dQw4w9WgXcQ_output.md"));
    }

    #[tokio::test]
    async fn write_document_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.md");
        write_document(&path, &DocumentResult::verbatim("first")).await.unwrap();
        write_document(&path, &DocumentResult::verbatim("second")).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        assert!(!path.with_extension("md.tmp").exists());
    }
}
