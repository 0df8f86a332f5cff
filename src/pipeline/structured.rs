//! Structured extraction for documents that carry their own text.
//!
//! The primary path hands the file to a structure-preserving converter
//! (`markitdown` by default) and keeps its output verbatim. When that fails
//! on a PDF, the text layer is read page by page as a lower-fidelity
//! recovery. Other formats have no fallback.

use crate::config::ConversionConfig;
use crate::error::{AttemptError, ConverterError};
use crate::format::{extension_of, DocumentFormat};
use crate::output::{DocumentResult, Strategy};
use crate::pipeline::docx;
use crate::pipeline::render::{self, PdfBackend};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Turns a document file into Markdown.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert(&self, path: &Path) -> Result<String, ConverterError>;
}

/// The `markitdown` command-line tool (or anything with the same contract:
/// file path in, Markdown on stdout).
#[derive(Debug, Clone)]
pub struct MarkItDownCli {
    cmd: PathBuf,
}

impl MarkItDownCli {
    pub fn new(cmd: impl Into<PathBuf>) -> Self {
        Self { cmd: cmd.into() }
    }
}

#[async_trait]
impl DocumentConverter for MarkItDownCli {
    async fn convert(&self, path: &Path) -> Result<String, ConverterError> {
        let output = tokio::process::Command::new(&self.cmd)
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ConverterError::NotFound(self.cmd.display().to_string()),
                _ => ConverterError::Failed(format!("failed to run {}: {e}", self.cmd.display())),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConverterError::Failed(format!(
                "{} exited with {}: {}",
                self.cmd.display(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Convert `path` with the structured converter, falling back to the PDF
/// text layer when applicable.
pub async fn run_structured(
    path: &Path,
    format: DocumentFormat,
    converter: &dyn DocumentConverter,
    pdf: Arc<dyn PdfBackend>,
    config: &ConversionConfig,
) -> Result<(DocumentResult, Strategy), AttemptError> {
    // Held until the end of this function; dropping it deletes the copy.
    let paginated = if config.paginate_docx && extension_of(path) == "docx" {
        match docx::paginated_copy(path).await {
            Ok(tmp) => Some(tmp),
            Err(e) => {
                warn!("Page markers not inserted into {}: {} (using original)", path.display(), e);
                None
            }
        }
    } else {
        None
    };
    let source = paginated.as_ref().map(|t| t.path()).unwrap_or(path);

    let primary = match tokio::time::timeout(
        Duration::from_secs(config.converter_timeout_secs),
        converter.convert(source),
    )
    .await
    {
        Ok(Ok(md)) if !md.trim().is_empty() => {
            info!("Structured conversion of {}: {} chars", path.display(), md.len());
            return Ok((DocumentResult::verbatim(md), Strategy::Structured));
        }
        Ok(Ok(_)) => "converter produced no text".to_string(),
        Ok(Err(e)) => e.to_string(),
        Err(_) => ConverterError::Timeout(config.converter_timeout_secs).to_string(),
    };
    warn!("Structured conversion of {} failed: {}", path.display(), primary);

    if format != DocumentFormat::Pdf {
        return Err(AttemptError::ConverterFailed(primary));
    }

    info!("Falling back to the PDF text layer for {}", path.display());
    match render::page_texts(pdf, path, config.password.clone()).await {
        Ok(texts) if !texts.is_empty() => {
            debug!("Text fallback: {} pages", texts.len());
            Ok((
                DocumentResult::verbatim(text_fallback_markdown(&texts)),
                Strategy::PdfTextFallback,
            ))
        }
        Ok(_) => Err(AttemptError::ConverterFailed(format!(
            "{primary}; text fallback found no pages"
        ))),
        Err(e) => Err(AttemptError::ConverterFailed(format!(
            "{primary}; text fallback failed: {e}"
        ))),
    }
}

/// One `## Página N` section per page of plain text.
pub fn text_fallback_markdown(texts: &[String]) -> String {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| format!("\n\n## Página {}\n\n{}\n", i + 1, text.trim()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::render::PageImage;

    struct Fails;

    #[async_trait]
    impl DocumentConverter for Fails {
        async fn convert(&self, _path: &Path) -> Result<String, ConverterError> {
            Err(ConverterError::Failed("boom".into()))
        }
    }

    struct Whitespace;

    #[async_trait]
    impl DocumentConverter for Whitespace {
        async fn convert(&self, _path: &Path) -> Result<String, ConverterError> {
            Ok(" \n\t\n".into())
        }
    }

    struct Texts(Vec<String>);

    impl PdfBackend for Texts {
        fn render_pages(
            &self,
            _path: &Path,
            _dpi: u32,
            _max_pixels: u32,
            _password: Option<&str>,
        ) -> Result<Vec<PageImage>, AttemptError> {
            Ok(Vec::new())
        }

        fn page_texts(&self, _path: &Path, _password: Option<&str>) -> Result<Vec<String>, String> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn fallback_sections() {
        let md = text_fallback_markdown(&["  um \n".into(), "dois".into()]);
        assert_eq!(md, "\n\n## Página 1\n\num\n\n\n## Página 2\n\ndois\n");
    }

    #[tokio::test]
    async fn pdf_falls_back_to_text_layer() {
        let pdf = Arc::new(Texts(vec!["a".into(), "b".into()]));
        let (doc, strategy) = run_structured(
            Path::new("x.pdf"),
            DocumentFormat::Pdf,
            &Fails,
            pdf,
            &ConversionConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(strategy, Strategy::PdfTextFallback);
        assert!(doc.markdown.contains("## Página 2"));
        assert!(!doc.bom);
    }

    #[tokio::test]
    async fn whitespace_output_counts_as_failure() {
        let pdf = Arc::new(Texts(vec!["texto".into()]));
        let (_, strategy) = run_structured(
            Path::new("x.pdf"),
            DocumentFormat::Pdf,
            &Whitespace,
            pdf,
            &ConversionConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(strategy, Strategy::PdfTextFallback);
    }

    #[tokio::test]
    async fn non_pdf_has_no_fallback() {
        let pdf = Arc::new(Texts(vec!["never read".into()]));
        let err = run_structured(
            Path::new("planilha.xlsx"),
            DocumentFormat::Spreadsheet,
            &Fails,
            pdf,
            &ConversionConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AttemptError::ConverterFailed(ref d) if d.contains("boom")));
    }

    #[tokio::test]
    async fn missing_converter_binary() {
        let err = MarkItDownCli::new("/nonexistent/markitdown")
            .convert(Path::new("a.docx"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConverterError::NotFound(_)));
    }
}
