//! Configuration for a document-to-Markdown pipeline run.
//!
//! Everything that used to be session state in an interactive front-end (the
//! cloud credential, the "force high quality" switch) lives here and is passed
//! explicitly into [`crate::convert::process`]. Nothing in the library reads
//! global mutable state.
//!
//! A config is also the session: the cloud credential is checked once per
//! config (and its clones), not once per document.
//!
//! The collaborator slots (`pdf_backend`, `ocr_engine`, `converter`,
//! `vision_backend`, `transcript_source`) default to the production implementations; tests and
//! embedding applications inject their own.

use crate::error::Doc2MdError;
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::render::PdfBackend;
use crate::pipeline::structured::DocumentConverter;
use crate::pipeline::transcript::TranscriptSource;
use crate::pipeline::vision::VisionBackend;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Default Gemini model for page structuring.
pub const DEFAULT_CLOUD_MODEL: &str = "gemini-2.5-flash";

/// Upper bound accepted for [`ConversionConfig::max_retries`].
pub const MAX_RETRIES: u32 = 10;

/// Configuration for one pipeline run.
///
/// Built via [`ConversionConfig::builder()`] or [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_doc2md::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .credential("AIza...")
///     .force_cloud(true)
///     .ocr_language("por")
///     .build()
///     .unwrap();
/// assert!(config.force_cloud);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Rasterisation DPI for OCR and cloud paths. Range: 72–600. Default: 300.
    ///
    /// 300 DPI is the usual floor for reliable Tesseract output on body text.
    pub dpi: u32,

    /// Cap on either rendered dimension in pixels. Default: 6000.
    ///
    /// Keeps poster-sized pages from exhausting memory at 300 DPI.
    pub max_rendered_pixels: u32,

    /// Minimum stripped characters for a page to count as "has text". Default: 30.
    pub min_text_chars: usize,

    /// Fraction of text pages at or above which a PDF is `digital`. Default: 0.7.
    pub digital_threshold: f32,

    /// Tesseract language model. Default: "por".
    pub ocr_language: String,

    /// Path or name of the tesseract binary. Default: "tesseract".
    pub tesseract_cmd: PathBuf,

    /// Per-page OCR timeout in seconds. Default: 120.
    pub ocr_timeout_secs: u64,

    /// Path or name of the structured converter binary. Default: "markitdown".
    pub converter_cmd: PathBuf,

    /// Structured converter timeout in seconds. Default: 300.
    pub converter_timeout_secs: u64,

    /// Inject `## PÁGINA N` markers at manual page breaks in `.docx` input. Default: true.
    pub paginate_docx: bool,

    /// API key for the Gemini backend. `None` disables cloud extraction
    /// unless `provider_name` or `vision_backend` is set.
    pub credential: Option<String>,

    /// Cloud model identifier. Default: [`DEFAULT_CLOUD_MODEL`].
    pub model: Option<String>,

    /// Named `edgequake-llm` provider ("openai", "anthropic", "ollama", …),
    /// used when no explicit credential is given.
    pub provider_name: Option<String>,

    /// Re-run scanned PDFs through the cloud even when local OCR succeeds. Default: false.
    pub force_cloud: bool,

    /// Concurrent cloud page calls. Default: 1 (strict page order).
    pub concurrency: usize,

    /// Retries per page on a cloud failure. Default: 1.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-page cloud call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Custom page prompt. `{page}` is replaced with the page number.
    pub prompt_template: Option<String>,

    /// Prefix OCR and cloud output with a UTF-8 BOM. Default: true.
    pub write_bom: bool,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Pre-built PDF renderer/text source. Default: pdfium.
    pub pdf_backend: Option<Arc<dyn PdfBackend>>,

    /// Pre-built OCR engine. Default: tesseract CLI.
    pub ocr_engine: Option<Arc<dyn OcrEngine>>,

    /// Pre-built structured converter. Default: markitdown CLI.
    pub converter: Option<Arc<dyn DocumentConverter>>,

    /// Pre-built cloud backend. Takes precedence over `credential` and `provider_name`.
    pub vision_backend: Option<Arc<dyn VisionBackend>>,

    /// Pre-built caption source for video URLs. Default: YouTube web pages.
    pub transcript_source: Option<Arc<dyn TranscriptSource>>,

    /// Optional per-stage / per-page progress events.
    pub progress_callback: Option<ProgressCallback>,

    /// Cloud backend resolved and verified on first use, shared by every clone
    /// of this config. Changing the cloud fields after that has no effect.
    cloud_session: Arc<OnceCell<Option<Arc<dyn VisionBackend>>>>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 6000,
            min_text_chars: 30,
            digital_threshold: 0.7,
            ocr_language: "por".to_string(),
            tesseract_cmd: PathBuf::from("tesseract"),
            ocr_timeout_secs: 120,
            converter_cmd: PathBuf::from("markitdown"),
            converter_timeout_secs: 300,
            paginate_docx: true,
            credential: None,
            model: None,
            provider_name: None,
            force_cloud: false,
            concurrency: 1,
            max_retries: 1,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            prompt_template: None,
            write_bom: true,
            password: None,
            pdf_backend: None,
            ocr_engine: None,
            converter: None,
            vision_backend: None,
            transcript_source: None,
            progress_callback: None,
            cloud_session: Arc::new(OnceCell::new()),
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("min_text_chars", &self.min_text_chars)
            .field("digital_threshold", &self.digital_threshold)
            .field("ocr_language", &self.ocr_language)
            .field("tesseract_cmd", &self.tesseract_cmd)
            .field("converter_cmd", &self.converter_cmd)
            .field("paginate_docx", &self.paginate_docx)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("force_cloud", &self.force_cloud)
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("write_bom", &self.write_bom)
            .field("vision_backend", &self.vision_backend.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Model to request from the cloud backend.
    pub fn cloud_model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_CLOUD_MODEL)
    }

    /// Whether any source of cloud access is configured (before probing).
    pub fn has_cloud_source(&self) -> bool {
        self.vision_backend.is_some()
            || self.credential.as_deref().is_some_and(|c| !c.trim().is_empty())
            || self.provider_name.is_some()
    }

    /// Session slot for the verified cloud backend.
    pub(crate) fn cloud_session(&self) -> &OnceCell<Option<Arc<dyn VisionBackend>>> {
        &self.cloud_session
    }
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl fmt::Debug for ConversionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ConversionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn min_text_chars(mut self, n: usize) -> Self {
        self.config.min_text_chars = n;
        self
    }

    pub fn digital_threshold(mut self, t: f32) -> Self {
        self.config.digital_threshold = t;
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn tesseract_cmd(mut self, cmd: impl Into<PathBuf>) -> Self {
        self.config.tesseract_cmd = cmd.into();
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs;
        self
    }

    pub fn converter_cmd(mut self, cmd: impl Into<PathBuf>) -> Self {
        self.config.converter_cmd = cmd.into();
        self
    }

    pub fn converter_timeout_secs(mut self, secs: u64) -> Self {
        self.config.converter_timeout_secs = secs;
        self
    }

    pub fn paginate_docx(mut self, v: bool) -> Self {
        self.config.paginate_docx = v;
        self
    }

    pub fn credential(mut self, key: impl Into<String>) -> Self {
        self.config.credential = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn force_cloud(mut self, v: bool) -> Self {
        self.config.force_cloud = v;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn prompt_template(mut self, template: impl Into<String>) -> Self {
        self.config.prompt_template = Some(template.into());
        self
    }

    pub fn write_bom(mut self, v: bool) -> Self {
        self.config.write_bom = v;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdf_backend(mut self, backend: Arc<dyn PdfBackend>) -> Self {
        self.config.pdf_backend = Some(backend);
        self
    }

    pub fn ocr_engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.config.ocr_engine = Some(engine);
        self
    }

    pub fn converter(mut self, converter: Arc<dyn DocumentConverter>) -> Self {
        self.config.converter = Some(converter);
        self
    }

    pub fn vision_backend(mut self, backend: Arc<dyn VisionBackend>) -> Self {
        self.config.vision_backend = Some(backend);
        self
    }

    pub fn transcript_source(mut self, source: Arc<dyn TranscriptSource>) -> Self {
        self.config.transcript_source = Some(source);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Doc2MdError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(Doc2MdError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if !(c.digital_threshold > 0.0 && c.digital_threshold <= 1.0) {
            return Err(Doc2MdError::InvalidConfig(format!(
                "Digital threshold must be in (0, 1], got {}",
                c.digital_threshold
            )));
        }
        if c.ocr_language.trim().is_empty() {
            return Err(Doc2MdError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        if c.api_timeout_secs == 0 || c.ocr_timeout_secs == 0 || c.converter_timeout_secs == 0 {
            return Err(Doc2MdError::InvalidConfig("Timeouts must be ≥ 1s".into()));
        }
        if c.max_retries > MAX_RETRIES {
            return Err(Doc2MdError::InvalidConfig(format!(
                "max_retries must be at most {MAX_RETRIES}, got {}",
                c.max_retries
            )));
        }
        if let Some(ref t) = c.prompt_template {
            if !t.contains("{page}") {
                return Err(Doc2MdError::InvalidConfig(
                    "Prompt template must contain the {page} placeholder".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let c = ConversionConfig::default();
        assert_eq!(c.dpi, 300);
        assert_eq!(c.min_text_chars, 30);
        assert!((c.digital_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(c.ocr_language, "por");
        assert_eq!(c.api_timeout_secs, 120);
        assert_eq!(c.concurrency, 1);
        assert!(c.write_bom);
        assert!(!c.force_cloud);
        assert_eq!(c.cloud_model(), DEFAULT_CLOUD_MODEL);
    }

    #[test]
    fn builder_rejects_out_of_range_dpi() {
        assert!(ConversionConfig::builder().dpi(50).build().is_err());
        assert!(ConversionConfig::builder().dpi(700).build().is_err());
        assert!(ConversionConfig::builder().dpi(150).build().is_ok());
    }

    #[test]
    fn builder_rejects_bad_threshold_and_template() {
        assert!(ConversionConfig::builder().digital_threshold(0.0).build().is_err());
        assert!(ConversionConfig::builder().digital_threshold(1.5).build().is_err());
        assert!(ConversionConfig::builder()
            .prompt_template("no placeholder")
            .build()
            .is_err());
        assert!(ConversionConfig::builder()
            .prompt_template("Página {page}")
            .build()
            .is_ok());
    }

    #[test]
    fn blank_credential_is_not_a_cloud_source() {
        let c = ConversionConfig::builder().credential("   ").build().unwrap();
        assert!(!c.has_cloud_source());
        let c = ConversionConfig::builder().credential("key").build().unwrap();
        assert!(c.has_cloud_source());
    }

    #[test]
    fn debug_redacts_credential() {
        let c = ConversionConfig::builder().credential("secret-key").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("secret-key"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn builder_bounds_retries() {
        assert!(ConversionConfig::builder().max_retries(MAX_RETRIES).build().is_ok());
        assert!(ConversionConfig::builder().max_retries(MAX_RETRIES + 1).build().is_err());
        assert!(ConversionConfig::builder().max_retries(u32::MAX).build().is_err());
    }

    #[test]
    fn concurrency_floor_is_one() {
        let c = ConversionConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }
}
