//! Pipeline entry points: drive one document through the cascade.
//!
//! [`process`] owns the side effects the pure state machine in
//! [`crate::cascade`] leaves out: it runs each stage, keeps what the stage
//! produced, and writes the chosen result exactly once when the cascade
//! finishes. A failed document leaves no file behind.
//!
//! Rasterised pages are cached for the run, so a cloud pass after local OCR
//! does not render the PDF twice.
//!
//! A video URL is accepted in place of a file path; it goes straight to the
//! transcript stage.

use crate::cascade::{self, Event, Failure, Finish, Policy, Stage, Step};
use crate::config::ConversionConfig;
use crate::error::{AttemptError, Doc2MdError};
use crate::format::{extension_of, DocumentFormat};
use crate::output::{
    write_document, AttemptRecord, DocumentResult, PageStatus, PipelineReport, Strategy,
};
use crate::pipeline::classify::{self, Verdict};
use crate::pipeline::cloud::run_cloud_structuring;
use crate::pipeline::ocr::{run_local_ocr, OcrEngine, TesseractEngine};
use crate::pipeline::render::{self, PageImage, PdfBackend};
use crate::pipeline::structured::{run_structured, DocumentConverter, MarkItDownCli};
use crate::pipeline::transcript::{fetch_transcript, TranscriptSource, YouTubeWebSource};
use crate::pipeline::vision::{session_backend, VisionBackend};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Convert `input` to Markdown at `output`.
///
/// # Returns
/// A [`PipelineReport`] once a result has been written. Individual pages may
/// still carry error placeholders; see `failed_pages`.
///
/// # Errors
/// Returns `Err(Doc2MdError)` when no branch of the cascade produced output
/// (nothing is written in that case) or when the output cannot be written.
pub async fn process(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<PipelineReport, Doc2MdError> {
    let input = input.as_ref();
    let output = output.as_ref();

    if let Some(cb) = &config.progress_callback {
        cb.on_document_start(input);
    }
    let result = run(input, output, config).await;
    if let Some(cb) = &config.progress_callback {
        cb.on_document_complete(input, result.is_ok());
    }

    match &result {
        Ok(report) => info!(
            "{} → {} via {:?} in {}ms",
            input.display(),
            output.display(),
            report.strategy,
            report.total_duration_ms
        ),
        Err(e) => warn!("{}", e),
    }
    result
}

/// Synchronous wrapper around [`process`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_sync(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<PipelineReport, Doc2MdError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Doc2MdError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process(input, output, config))
}

/// Run only the digital-vs-scanned triage on a PDF.
///
/// Does not need OCR, a converter, or cloud access.
pub async fn classify_document(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<Verdict, Doc2MdError> {
    let input = input.as_ref();
    ensure_exists(input).await?;
    if DocumentFormat::from_path(input) != DocumentFormat::Pdf {
        return Err(Doc2MdError::UnsupportedFormat {
            path: input.to_path_buf(),
            extension: extension_of(input),
        });
    }
    Ok(classify::classify(input, config).await)
}

async fn ensure_exists(input: &Path) -> Result<(), Doc2MdError> {
    match tokio::fs::metadata(input).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(Doc2MdError::FileNotFound {
            path: input.to_path_buf(),
        }),
    }
}

// ── Cascade driver ───────────────────────────────────────────────────────

/// Everything one document run accumulates between stages.
struct Run<'a> {
    input: &'a Path,
    format: DocumentFormat,
    config: &'a ConversionConfig,
    pdf: Arc<dyn PdfBackend>,

    verdict: Option<Verdict>,
    attempts: Vec<AttemptRecord>,
    /// `None` until a cloud transition first needs it.
    cloud: Option<Option<Arc<dyn VisionBackend>>>,
    pages: Option<Result<Vec<PageImage>, AttemptError>>,

    structured: Option<(DocumentResult, Strategy)>,
    local: Option<DocumentResult>,
    cloud_result: Option<DocumentResult>,
    transcript: Option<DocumentResult>,
}

async fn run(
    input: &Path,
    output: &Path,
    config: &ConversionConfig,
) -> Result<PipelineReport, Doc2MdError> {
    let started = Instant::now();
    let format = DocumentFormat::from_input(input);
    if !format.is_remote() {
        ensure_exists(input).await?;
    }
    info!("Processing {} ({:?})", input.display(), format);

    let mut run = Run {
        input,
        format,
        config,
        pdf: render::backend_for(config),
        verdict: None,
        attempts: Vec::new(),
        cloud: None,
        pages: None,
        structured: None,
        local: None,
        cloud_result: None,
        transcript: None,
    };

    let mut step = cascade::start(format);
    let finish = loop {
        match step {
            Step::Finish(finish) => break finish,
            Step::Run(stage) => {
                info!("Stage: {}", stage);
                if let Some(cb) = &config.progress_callback {
                    cb.on_stage(stage);
                }
                let event = run.execute(stage).await;
                debug!("Stage {} → {:?}", stage, event);
                step = cascade::next(stage, event, run.policy());
            }
        }
    };

    let (doc, strategy) = match finish {
        Finish::Keep(stage) => run.take_result(stage)?,
        Finish::Fail(failure) => return Err(run.failure_error(failure)),
    };

    write_document(output, &doc).await?;

    Ok(PipelineReport {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        format,
        verdict: run.verdict,
        strategy,
        cloud_available: matches!(run.cloud, Some(Some(_))),
        total_pages: doc.pages.len(),
        empty_pages: doc.count(PageStatus::Empty),
        failed_pages: doc.count(PageStatus::ExtractionError),
        attempts: run.attempts,
        total_duration_ms: started.elapsed().as_millis() as u64,
    })
}

impl Run<'_> {
    fn policy(&self) -> Policy {
        Policy {
            cloud_available: matches!(self.cloud, Some(Some(_))),
            force_cloud: self.config.force_cloud,
        }
    }

    fn record(&mut self, stage: Stage, started: Instant, outcome: Result<Option<String>, String>) {
        let (succeeded, detail) = match outcome {
            Ok(note) => (true, note),
            Err(detail) => (false, Some(detail)),
        };
        self.attempts.push(AttemptRecord {
            stage,
            succeeded,
            detail,
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }

    async fn execute(&mut self, stage: Stage) -> Event {
        let started = Instant::now();
        match stage {
            Stage::Classify => {
                let verdict = classify::classify(self.input, self.config).await;
                let kind = verdict.kind;
                self.record(
                    stage,
                    started,
                    Ok(Some(format!("{:?}, ratio {:.2}", kind, verdict.ratio))),
                );
                self.verdict = Some(verdict);
                Event::Classified(kind)
            }

            Stage::StructuredExtract => {
                let converter = self.converter();
                match run_structured(
                    self.input,
                    self.format,
                    converter.as_ref(),
                    Arc::clone(&self.pdf),
                    self.config,
                )
                .await
                {
                    Ok((doc, strategy)) => {
                        self.record(stage, started, Ok(Some(format!("{strategy:?}"))));
                        self.structured = Some((doc, strategy));
                        Event::Succeeded
                    }
                    Err(e) => {
                        self.record(stage, started, Err(e.to_string()));
                        Event::Failed
                    }
                }
            }

            Stage::LocalOcr => {
                let engine = self.ocr_engine();
                let config = self.config;
                let outcome = match self.pages().await {
                    Ok(pages) => {
                        run_local_ocr(
                            engine.as_ref(),
                            pages,
                            config,
                            config.progress_callback.as_ref(),
                        )
                        .await
                    }
                    Err(e) => Err(e),
                };
                let event = match outcome {
                    Ok(doc) => {
                        self.record(stage, started, Ok(None));
                        self.local = Some(doc);
                        Event::Succeeded
                    }
                    Err(e) => {
                        self.record(stage, started, Err(e.to_string()));
                        Event::Failed
                    }
                };
                // Only a fallback or a forced upgrade can use the cloud.
                if event == Event::Failed || self.config.force_cloud {
                    self.resolve_cloud().await;
                }
                event
            }

            Stage::CloudUpgrade | Stage::CloudFallback => {
                self.resolve_cloud().await;
                let Some(Some(backend)) = self.cloud.clone() else {
                    self.record(stage, started, Err(AttemptError::BackendUnavailable.to_string()));
                    return Event::Failed;
                };
                let config = self.config;
                let outcome = match self.pages().await {
                    Ok(pages) => {
                        run_cloud_structuring(
                            backend.as_ref(),
                            pages,
                            stage,
                            config,
                            config.progress_callback.as_ref(),
                        )
                        .await
                    }
                    Err(e) => Err(e),
                };
                match outcome {
                    Ok(doc) => {
                        self.record(stage, started, Ok(Some(backend.name().to_string())));
                        self.cloud_result = Some(doc);
                        Event::Succeeded
                    }
                    Err(e) => {
                        self.record(stage, started, Err(e.to_string()));
                        Event::Failed
                    }
                }
            }

            Stage::Transcript => {
                let source = self.transcript_source();
                let input = self.input;
                let url = input.to_string_lossy();
                let limit = Duration::from_secs(self.config.api_timeout_secs);
                match fetch_transcript(source.as_ref(), &url, limit).await {
                    Ok(transcript) => {
                        let markdown = transcript.to_markdown(&url);
                        self.record(stage, started, Ok(Some(transcript.info)));
                        self.transcript = Some(DocumentResult::verbatim(markdown));
                        Event::Succeeded
                    }
                    Err(e) => {
                        let err = AttemptError::TranscriptFailed(e.to_string());
                        self.record(stage, started, Err(err.to_string()));
                        Event::Failed
                    }
                }
            }
        }
    }

    /// Fetch the session's cloud backend, probing it on first use.
    async fn resolve_cloud(&mut self) {
        if self.cloud.is_none() {
            self.cloud = Some(session_backend(self.config).await);
        }
    }

    /// Rasterise on first use; later stages reuse the pages (or the error).
    async fn pages(&mut self) -> Result<&[PageImage], AttemptError> {
        if self.pages.is_none() {
            let rendered = render::rasterize(Arc::clone(&self.pdf), self.input, self.config).await;
            if let Ok(pages) = &rendered {
                info!("Rasterised {} pages at {} DPI", pages.len(), self.config.dpi);
            }
            self.pages = Some(rendered);
        }
        match &self.pages {
            Some(Ok(pages)) => Ok(pages.as_slice()),
            Some(Err(e)) => Err(e.clone()),
            None => Err(AttemptError::RasterisationFailed("pages not rendered".into())),
        }
    }

    fn ocr_engine(&self) -> Arc<dyn OcrEngine> {
        self.config
            .ocr_engine
            .clone()
            .unwrap_or_else(|| Arc::new(TesseractEngine::new(self.config.tesseract_cmd.clone())))
    }

    fn converter(&self) -> Arc<dyn DocumentConverter> {
        self.config
            .converter
            .clone()
            .unwrap_or_else(|| Arc::new(MarkItDownCli::new(self.config.converter_cmd.clone())))
    }

    fn transcript_source(&self) -> Arc<dyn TranscriptSource> {
        self.config.transcript_source.clone().unwrap_or_else(|| {
            Arc::new(YouTubeWebSource::new(Duration::from_secs(
                self.config.api_timeout_secs,
            )))
        })
    }

    fn take_result(&mut self, stage: Stage) -> Result<(DocumentResult, Strategy), Doc2MdError> {
        let taken = match stage {
            Stage::StructuredExtract => self.structured.take(),
            Stage::LocalOcr => self.local.take().map(|d| (d, Strategy::LocalOcr)),
            Stage::CloudUpgrade | Stage::CloudFallback => {
                self.cloud_result.take().map(|d| (d, Strategy::Cloud))
            }
            Stage::Transcript => self.transcript.take().map(|d| (d, Strategy::Transcript)),
            Stage::Classify => None,
        };
        taken.ok_or_else(|| Doc2MdError::Internal(format!("no result held for stage {stage}")))
    }

    fn last_failure(&self) -> String {
        self.attempts
            .iter()
            .rev()
            .find(|a| !a.succeeded)
            .and_then(|a| a.detail.clone())
            .unwrap_or_else(|| "unknown error".to_string())
    }

    fn failure_error(&self, failure: Failure) -> Doc2MdError {
        let path = self.input.to_path_buf();
        match failure {
            Failure::UnsupportedFormat => Doc2MdError::UnsupportedFormat {
                extension: extension_of(self.input),
                path,
            },
            Failure::StructuredFailed => Doc2MdError::StructuredExtractionFailed {
                path,
                detail: self.last_failure(),
            },
            Failure::NoCloudFallback => Doc2MdError::NoCloudFallback {
                path,
                detail: self.last_failure(),
            },
            Failure::TranscriptUnavailable => Doc2MdError::TranscriptUnavailable {
                url: self.input.to_string_lossy().into_owned(),
                detail: self.last_failure(),
            },
            Failure::CascadeExhausted => Doc2MdError::CascadeExhausted {
                path,
                summary: self
                    .attempts
                    .iter()
                    .filter(|a| !a.succeeded)
                    .map(|a| format!("  {}: {}", a.stage, a.detail.as_deref().unwrap_or("failed")))
                    .collect::<Vec<_>>()
                    .join("\n"),
            },
        }
    }
}

