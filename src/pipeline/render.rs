//! PDF access: rasterise pages to `DynamicImage` and read the text layer.
//!
//! pdfium is not async-safe, so both operations run inside
//! `tokio::task::spawn_blocking`. The [`PdfBackend`] trait lets tests swap
//! pdfium for synthetic pages.
//!
//! Pages are scaled from PDF points (1/72 in) to the configured DPI, then
//! capped at `max_rendered_pixels` on either edge so oversized sheets stay
//! within memory.
//!
//! Page text is returned in reading order (top to bottom, then left to
//! right), not in content-stream order, which is whatever order the
//! producing application drew the glyphs in.

use crate::config::ConversionConfig;
use crate::error::AttemptError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Environment variable naming the directory that holds the pdfium library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// One rasterised page. A page that failed to render keeps its slot.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 1-based.
    pub page_num: usize,
    pub image: Result<DynamicImage, String>,
}

/// Rendering and text extraction for PDF files.
///
/// Implementations are called from the blocking thread pool.
pub trait PdfBackend: Send + Sync {
    /// Render every page. Fails only when the document cannot be opened.
    fn render_pages(
        &self,
        path: &Path,
        dpi: u32,
        max_pixels: u32,
        password: Option<&str>,
    ) -> Result<Vec<PageImage>, AttemptError>;

    /// Plain text of every page, in page order.
    fn page_texts(&self, path: &Path, password: Option<&str>) -> Result<Vec<String>, String>;
}

/// pdfium-backed implementation.
#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    /// Directory containing the pdfium shared library. `None` tries the
    /// working directory, then the system library path.
    library_dir: Option<PathBuf>,
}

impl PdfiumBackend {
    pub fn new(library_dir: Option<PathBuf>) -> Self {
        Self { library_dir }
    }

    /// Honour [`PDFIUM_LIB_PATH_ENV`] when set.
    pub fn from_env() -> Self {
        Self::new(std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from))
    }

    fn bind(&self) -> Result<Pdfium, String> {
        let bindings = match &self.library_dir {
            Some(dir) => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            }
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| format!("pdfium library unavailable: {e:?}"))?;
        Ok(Pdfium::new(bindings))
    }
}

impl PdfBackend for PdfiumBackend {
    fn render_pages(
        &self,
        path: &Path,
        dpi: u32,
        max_pixels: u32,
        password: Option<&str>,
    ) -> Result<Vec<PageImage>, AttemptError> {
        let pdfium = self.bind().map_err(AttemptError::RasterisationFailed)?;
        let document = pdfium
            .load_pdf_from_file(path, password)
            .map_err(|e| AttemptError::RasterisationFailed(format!("cannot open PDF: {e:?}")))?;

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(dpi as f32 / 72.0)
            .set_maximum_width(max_pixels as i32)
            .set_maximum_height(max_pixels as i32);

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());

        let mut out = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            let page_num = idx + 1;
            let image = page
                .render_with_config(&render_config)
                .map(|bitmap| bitmap.as_image())
                .map_err(|e| format!("{e:?}"));

            match &image {
                Ok(img) => debug!("Rendered page {} → {}x{} px", page_num, img.width(), img.height()),
                Err(e) => warn!("Page {}: render failed: {}", page_num, e),
            }
            out.push(PageImage { page_num, image });
        }

        Ok(out)
    }

    fn page_texts(&self, path: &Path, password: Option<&str>) -> Result<Vec<String>, String> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(path, password)
            .map_err(|e| format!("cannot open PDF: {e:?}"))?;

        let texts = document
            .pages()
            .iter()
            .enumerate()
            .map(|(idx, page)| match page.text() {
                Ok(text) => {
                    let runs: Vec<TextRun> = text
                        .segments()
                        .iter()
                        .map(|segment| {
                            let bounds = segment.bounds();
                            TextRun {
                                top: bounds.top().value,
                                left: bounds.left().value,
                                text: segment.text(),
                            }
                        })
                        .collect();
                    if runs.is_empty() {
                        text.all()
                    } else {
                        reading_order(runs)
                    }
                }
                Err(e) => {
                    warn!("Page {}: text extraction failed: {:?}", idx + 1, e);
                    String::new()
                }
            })
            .collect();
        Ok(texts)
    }
}

/// A positioned run of page text. Coordinates are PDF points with the origin
/// at the bottom-left, so a larger `top` is higher on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub top: f32,
    pub left: f32,
    pub text: String,
}

/// Runs whose tops differ by at most this many points share a line.
const LINE_TOLERANCE_PT: f32 = 2.0;

/// Join text runs top-to-bottom, then left-to-right. One output line per
/// visual line, runs on a line separated by a space.
pub fn reading_order(mut runs: Vec<TextRun>) -> String {
    runs.retain(|r| !r.text.trim().is_empty());
    runs.sort_by(|a, b| b.top.total_cmp(&a.top).then(a.left.total_cmp(&b.left)));

    let mut lines: Vec<Vec<TextRun>> = Vec::new();
    for run in runs {
        match lines.last_mut() {
            Some(line) if (line[0].top - run.top).abs() <= LINE_TOLERANCE_PT => line.push(run),
            _ => lines.push(vec![run]),
        }
    }

    lines
        .into_iter()
        .map(|mut line| {
            line.sort_by(|a, b| a.left.total_cmp(&b.left));
            line.iter()
                .map(|r| r.text.trim())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The configured backend, or pdfium.
pub fn backend_for(config: &ConversionConfig) -> Arc<dyn PdfBackend> {
    config
        .pdf_backend
        .clone()
        .unwrap_or_else(|| Arc::new(PdfiumBackend::from_env()))
}

/// Rasterise every page of `path` at the configured DPI.
///
/// Zero pages is an attempt failure: there is nothing to OCR.
pub async fn rasterize(
    backend: Arc<dyn PdfBackend>,
    path: &Path,
    config: &ConversionConfig,
) -> Result<Vec<PageImage>, AttemptError> {
    let path = path.to_path_buf();
    let dpi = config.dpi;
    let max_pixels = config.max_rendered_pixels;
    let password = config.password.clone();

    let pages = tokio::task::spawn_blocking(move || {
        backend.render_pages(&path, dpi, max_pixels, password.as_deref())
    })
    .await
    .map_err(|e| AttemptError::RasterisationFailed(format!("render task panicked: {e}")))??;

    if pages.is_empty() {
        return Err(AttemptError::RasterisationFailed(
            "document has no renderable pages".into(),
        ));
    }
    Ok(pages)
}

/// Read the text layer of every page of `path`.
pub async fn page_texts(
    backend: Arc<dyn PdfBackend>,
    path: &Path,
    password: Option<String>,
) -> Result<Vec<String>, String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || backend.page_texts(&path, password.as_deref()))
        .await
        .map_err(|e| format!("text task panicked: {e}"))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    struct FixedPages(usize);

    impl PdfBackend for FixedPages {
        fn render_pages(
            &self,
            _path: &Path,
            _dpi: u32,
            _max_pixels: u32,
            _password: Option<&str>,
        ) -> Result<Vec<PageImage>, AttemptError> {
            Ok((1..=self.0)
                .map(|page_num| PageImage {
                    page_num,
                    image: Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                        4,
                        4,
                        Rgba([255, 255, 255, 255]),
                    ))),
                })
                .collect())
        }

        fn page_texts(&self, _path: &Path, _password: Option<&str>) -> Result<Vec<String>, String> {
            Ok(vec![String::new(); self.0])
        }
    }

    fn run(top: f32, left: f32, text: &str) -> TextRun {
        TextRun {
            top,
            left,
            text: text.to_string(),
        }
    }

    #[test]
    fn text_is_read_top_down_then_left_right() {
        // Drawn footer first, then the right column before the left.
        let runs = vec![
            run(40.0, 72.0, "rodapé"),
            run(700.0, 300.0, "direita"),
            run(700.0, 72.0, "esquerda"),
            run(750.0, 72.0, "Título"),
        ];
        assert_eq!(reading_order(runs), "Título\nesquerda direita\nrodapé");
    }

    #[test]
    fn small_baseline_jitter_stays_on_one_line() {
        let runs = vec![
            run(500.0, 200.0, "mundo"),
            run(501.5, 72.0, "olá"),
            run(480.0, 72.0, "próxima"),
        ];
        assert_eq!(reading_order(runs), "olá mundo\npróxima");
    }

    #[test]
    fn blank_runs_are_dropped() {
        let runs = vec![run(10.0, 0.0, "  "), run(20.0, 0.0, " texto \n")];
        assert_eq!(reading_order(runs), "texto");
        assert_eq!(reading_order(Vec::new()), "");
    }

    #[tokio::test]
    async fn rasterize_keeps_page_order() {
        let pages = rasterize(Arc::new(FixedPages(3)), Path::new("x.pdf"), &ConversionConfig::default())
            .await
            .unwrap();
        let nums: Vec<_> = pages.iter().map(|p| p.page_num).collect();
        assert_eq!(nums, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn zero_pages_fails_the_attempt() {
        let err = rasterize(Arc::new(FixedPages(0)), Path::new("x.pdf"), &ConversionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AttemptError::RasterisationFailed(_)));
    }

    #[tokio::test]
    async fn missing_library_dir_is_an_attempt_error() {
        let backend = PdfiumBackend::new(Some(PathBuf::from("/nonexistent/pdfium")));
        let err = rasterize(Arc::new(backend), Path::new("x.pdf"), &ConversionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AttemptError::RasterisationFailed(_)));
    }
}
