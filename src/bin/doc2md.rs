//! CLI binary for edgequake-doc2md.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig`, runs each input through the cascade, and prints a
//! summary per document.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_doc2md::{
    classify_document, default_output_path, process, ConversionConfig,
    ConversionProgressCallback, PageStatus, PipelineReport, ProgressCallback, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner while a stage runs, page bar during OCR and cloud passes.
struct CliProgressCallback {
    bar: ProgressBar,
    page_errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::hidden();
        Arc::new(Self {
            bar,
            page_errors: AtomicUsize::new(0),
        })
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS)
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_document_start(&self, input: &Path) {
        self.page_errors.store(0, Ordering::SeqCst);
        self.bar.reset();
        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.bar.set_style(Self::spinner_style());
        self.bar.set_length(0);
        self.bar.set_prefix(
            input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        self.bar.set_message("starting…");
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn on_stage(&self, stage: Stage) {
        self.bar.set_style(Self::spinner_style());
        self.bar.set_message(stage.to_string());
    }

    fn on_pages_start(&self, stage: Stage, total_pages: usize) {
        self.bar.set_style(Self::bar_style());
        self.bar.set_length(total_pages as u64);
        self.bar.set_position(0);
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{stage}: {total_pages} pages"))
        ));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, status: PageStatus) {
        let tag = match status {
            PageStatus::Empty => dim("empty"),
            _ => String::new(),
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total,
            tag
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        self.page_errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, _input: &Path, _success: bool) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert one document (writes markdown_output/contrato_output.md next to it)
  doc2md contrato.pdf

  # Explicit output file
  doc2md contrato.pdf -o contrato.md

  # Several documents into one directory
  doc2md *.pdf *.docx --output-dir convertidos/

  # Scanned PDFs: let Gemini re-structure even when tesseract succeeds
  GEMINI_API_KEY=AIza... doc2md --force-cloud digitalizado.pdf

  # Use another vision provider resolved by edgequake-llm
  OPENAI_API_KEY=sk-... doc2md --provider openai --model gpt-4.1-mini scan.pdf

  # Transcript of a YouTube video (writes markdown_output/youtube_<id>_output.md)
  doc2md "https://www.youtube.com/watch?v=dQw4w9WgXcQ"

  # Only report whether a PDF is digital or scanned
  doc2md --classify-only --json *.pdf

CASCADE:
  YouTube URL      → caption transcript (pt, pt-BR, en, en-US preferred)
  non-PDF          → structured converter (markitdown)
  digital PDF      → structured converter → PDF text fallback
  scanned PDF      → tesseract → (cloud upgrade with --force-cloud)
                               → cloud fallback when tesseract fails

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY     Gemini API key (enables cloud structuring)
  TESSERACT_CMD      tesseract binary (default: tesseract on PATH)
  DOC2MD_CONVERTER   structured converter binary (default: markitdown)
  PDFIUM_LIB_PATH    directory containing libpdfium
  RUST_LOG           log filter override
"#;

/// Convert documents to Markdown with a triage-and-fallback extraction cascade.
#[derive(Parser, Debug)]
#[command(
    name = "doc2md",
    version,
    about = "Convert PDF, office, image and audio documents to Markdown",
    long_about = "Convert documents to Markdown. PDFs are classified as digital or scanned; \
digital documents and other formats go through a structure-preserving converter, scanned PDFs \
through local OCR with an optional cloud vision pass.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// One or more input documents or YouTube URLs.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output file (single input only).
    #[arg(short, long, conflicts_with = "output_dir")]
    output: Option<PathBuf>,

    /// Write `<stem>_output.md` files into this directory.
    #[arg(long, env = "DOC2MD_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Gemini API key for cloud structuring.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// edgequake-llm provider (openai, anthropic, gemini, ollama, …), used
    /// when no API key is given.
    #[arg(long, env = "DOC2MD_PROVIDER")]
    provider: Option<String>,

    /// Cloud model ID. Default: gemini-2.5-flash with an API key.
    #[arg(long, env = "DOC2MD_MODEL")]
    model: Option<String>,

    /// Re-run scanned PDFs through the cloud even when local OCR succeeds.
    #[arg(long, env = "DOC2MD_FORCE_CLOUD")]
    force_cloud: bool,

    /// Rasterisation DPI (72–600).
    #[arg(long, env = "DOC2MD_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Tesseract language model.
    #[arg(long, env = "DOC2MD_LANG", default_value = "por")]
    lang: String,

    /// tesseract binary.
    #[arg(long, env = "TESSERACT_CMD", default_value = "tesseract")]
    tesseract_cmd: PathBuf,

    /// Structured converter binary.
    #[arg(long, env = "DOC2MD_CONVERTER", default_value = "markitdown")]
    converter_cmd: PathBuf,

    /// Concurrent cloud page calls.
    #[arg(short, long, env = "DOC2MD_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Retries per page on cloud failure (0–10).
    #[arg(long, env = "DOC2MD_MAX_RETRIES", default_value_t = 1,
          value_parser = clap::value_parser!(u32).range(0..=10))]
    max_retries: u32,

    /// Per-page cloud call timeout in seconds.
    #[arg(long, env = "DOC2MD_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Per-page OCR timeout in seconds.
    #[arg(long, env = "DOC2MD_OCR_TIMEOUT", default_value_t = 120)]
    ocr_timeout: u64,

    /// Text file with a custom page prompt; `{page}` is replaced by the page number.
    #[arg(long, env = "DOC2MD_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "DOC2MD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Do not prefix OCR/cloud output with a UTF-8 byte-order mark.
    #[arg(long)]
    no_bom: bool,

    /// Do not insert page markers into .docx input.
    #[arg(long)]
    no_docx_pages: bool,

    /// Only classify PDFs as digital or scanned; write nothing.
    #[arg(long)]
    classify_only: bool,

    /// Print pipeline reports (or verdicts) as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOC2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOC2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOC2MD_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the feedback; library INFO logs would tear it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.classify_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if cli.output.is_some() && cli.inputs.len() > 1 {
        anyhow::bail!("--output takes a single input; use --output-dir for several");
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Classify-only mode ───────────────────────────────────────────────
    if cli.classify_only {
        return classify_all(&cli, &config).await;
    }

    // Ctrl-C finishes the current document, then stops.
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&interrupted);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                flag.store(true, Ordering::SeqCst);
            }
        });
    }

    // ── Run conversions ──────────────────────────────────────────────────
    let mut reports: Vec<PipelineReport> = Vec::new();
    let mut failures = 0usize;

    for input in &cli.inputs {
        if interrupted.load(Ordering::SeqCst) {
            eprintln!("{} interrupted; remaining inputs skipped", cyan("⚠"));
            break;
        }
        let output = output_path_for(&cli, input);
        match process(input, &output, &config).await {
            Ok(report) => {
                if !cli.quiet && !cli.json {
                    print_summary(&report);
                }
                reports.push(report);
            }
            Err(e) => {
                failures += 1;
                eprintln!("{} {}: {}", red("✘"), input.display(), e);
            }
        }
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&reports).context("Failed to serialise reports")?
        );
    }

    if failures > 0 {
        anyhow::bail!("{} of {} documents failed", failures, cli.inputs.len());
    }
    Ok(())
}

async fn classify_all(cli: &Cli, config: &ConversionConfig) -> Result<()> {
    let mut verdicts = Vec::new();
    for input in &cli.inputs {
        let verdict = classify_document(input, config)
            .await
            .with_context(|| format!("Failed to classify {}", input.display()))?;
        if cli.json {
            verdicts.push(serde_json::json!({ "input": input, "verdict": verdict }));
        } else {
            println!(
                "{}: {:?} ({}/{} pages with text, ratio {:.2})",
                input.display(),
                verdict.kind,
                verdict.pages_with_text,
                verdict.total_pages,
                verdict.ratio
            );
        }
    }
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&verdicts).context("Failed to serialise verdicts")?
        );
    }
    Ok(())
}

fn output_path_for(cli: &Cli, input: &Path) -> PathBuf {
    if let Some(ref out) = cli.output {
        return out.clone();
    }
    match cli.output_dir {
        Some(ref dir) => {
            let default = default_output_path(input);
            match default.file_name() {
                Some(name) => dir.join(name),
                None => dir.join("document_output.md"),
            }
        }
        None => default_output_path(input),
    }
}

fn print_summary(report: &PipelineReport) {
    let mark = if report.failed_pages == 0 {
        green("✔")
    } else {
        cyan("⚠")
    };
    let pages = if report.total_pages > 0 {
        format!(
            "{} pages ({} empty, {} failed)  ",
            report.total_pages, report.empty_pages, report.failed_pages
        )
    } else {
        String::new()
    };
    eprintln!(
        "{}  {}  {:?}  {}{}ms  →  {}",
        mark,
        report.input.display(),
        report.strategy,
        pages,
        report.total_duration_ms,
        bold(&report.output.display().to_string()),
    );
    for attempt in report.attempts.iter().filter(|a| !a.succeeded) {
        eprintln!(
            "   {} {}",
            dim(&format!("{}:", attempt.stage)),
            dim(attempt.detail.as_deref().unwrap_or("failed"))
        );
    }
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .dpi(cli.dpi)
        .ocr_language(cli.lang.clone())
        .tesseract_cmd(cli.tesseract_cmd.clone())
        .ocr_timeout_secs(cli.ocr_timeout)
        .converter_cmd(cli.converter_cmd.clone())
        .force_cloud(cli.force_cloud)
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .write_bom(!cli.no_bom)
        .paginate_docx(!cli.no_docx_pages);

    if let Some(ref path) = cli.prompt_file {
        let template = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.prompt_template(template);
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.credential(key.clone());
    }
    if let Some(ref name) = cli.provider {
        builder = builder.provider_name(name.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
