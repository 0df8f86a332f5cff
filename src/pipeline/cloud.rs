//! Cloud structuring: one backend call per page, OCR and Markdown in one step.
//!
//! A failed page never aborts the document. Backend errors and timeouts are
//! retried with exponential backoff (`retry_backoff_ms * 2^attempt`), then
//! replaced by an error placeholder. The run only counts as a success when at
//! least one page came back with real content.
//!
//! With `concurrency > 1` pages are sent through `buffer_unordered` and
//! re-sorted by page number before assembly.

use crate::cascade::Stage;
use crate::config::ConversionConfig;
use crate::error::{AttemptError, BackendError, PageError};
use crate::output::{DocumentResult, PageResult, PageStatus};
use crate::pipeline::encode::{encode_page, EncodedPage};
use crate::pipeline::postprocess::parse_response;
use crate::pipeline::render::PageImage;
use crate::pipeline::vision::VisionBackend;
use crate::prompts::page_prompt;
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Upper bound on a single retry delay.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Run every page through `backend`.
pub async fn run_cloud_structuring(
    backend: &dyn VisionBackend,
    pages: &[PageImage],
    stage: Stage,
    config: &ConversionConfig,
    progress: Option<&ProgressCallback>,
) -> Result<DocumentResult, AttemptError> {
    let total = pages.len();
    info!(
        "Cloud structuring via '{}': {} pages, concurrency {}",
        backend.name(),
        total,
        config.concurrency
    );
    if let Some(cb) = progress {
        cb.on_pages_start(stage, total);
    }

    let mut results: Vec<PageResult> = stream::iter(pages.iter().map(|page| async move {
        let result = process_page(backend, page, config).await;
        report(&result, total, progress);
        result
    }))
    .buffer_unordered(config.concurrency.max(1))
    .collect()
    .await;
    results.sort_by_key(|r| r.page_num);

    let ok = results.iter().filter(|r| r.status == PageStatus::Ok).count();
    info!("Cloud structuring finished: {}/{} pages ok", ok, total);
    if ok == 0 {
        let first_error = results
            .iter()
            .find_map(|r| r.error.as_ref().map(ToString::to_string))
            .unwrap_or_else(|| "no pages".to_string());
        return Err(AttemptError::NoUsablePages { total, first_error });
    }

    Ok(DocumentResult::from_pages(results, config.write_bom))
}

fn report(result: &PageResult, total: usize, progress: Option<&ProgressCallback>) {
    let Some(cb) = progress else { return };
    match &result.error {
        Some(e) => cb.on_page_error(result.page_num, total, &e.to_string()),
        None => cb.on_page_complete(result.page_num, total, result.status),
    }
}

/// Encode, prompt, call with retries, parse. Always yields a result.
async fn process_page(
    backend: &dyn VisionBackend,
    page: &PageImage,
    config: &ConversionConfig,
) -> PageResult {
    let n = page.page_num;
    let start = Instant::now();

    let encoded = match &page.image {
        Ok(img) => encode_page(img).map_err(|e| e.to_string()),
        Err(detail) => Err(detail.clone()),
    };
    let encoded = match encoded {
        Ok(enc) => enc,
        Err(detail) => {
            warn!("Page {}: no image to send: {}", n, detail);
            return PageResult::failed(n, PageError::RenderFailed { page: n, detail });
        }
    };

    let prompt = page_prompt(n, config.prompt_template.as_deref());
    let (outcome, retries) = call_with_retry(backend, n, &prompt, &encoded, config).await;
    let elapsed = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(raw) => match parse_response(&raw) {
            Some(markdown) => {
                debug!("Page {}: {} chars after parsing", n, markdown.len());
                PageResult::ok(n, markdown)
            }
            None => {
                warn!("Page {}: empty response", n);
                PageResult::failed(n, PageError::EmptyResponse { page: n })
            }
        },
        Err(e) => PageResult::failed(
            n,
            PageError::ApiFailed {
                page: n,
                retries,
                detail: e.to_string(),
            },
        ),
    }
    .with_timing(elapsed, retries)
}

async fn call_with_retry(
    backend: &dyn VisionBackend,
    page_num: usize,
    prompt: &str,
    image: &EncodedPage,
    config: &ConversionConfig,
) -> (Result<String, BackendError>, u32) {
    let limit = Duration::from_secs(config.api_timeout_secs);
    let mut last_err = BackendError::Request("no attempt made".into());

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_delay(config.retry_backoff_ms, attempt);
            warn!(
                "Page {}: retry {}/{} after {}ms",
                page_num,
                attempt,
                config.max_retries,
                backoff.as_millis()
            );
            sleep(backoff).await;
        }

        let outcome = match timeout(limit, backend.transcribe(page_num, prompt, image)).await {
            Ok(r) => r,
            Err(_) => Err(BackendError::Timeout(config.api_timeout_secs)),
        };

        match outcome {
            Ok(text) => return (Ok(text), attempt),
            // Retrying a rejected key or a content block changes nothing.
            Err(e @ (BackendError::Auth(_) | BackendError::Blocked(_))) => {
                warn!("Page {}: {}", page_num, e);
                return (Err(e), attempt);
            }
            Err(e) => {
                warn!("Page {}: attempt {} failed: {}", page_num, attempt + 1, e);
                last_err = e;
            }
        }
    }

    (Err(last_err), config.max_retries)
}

/// Delay before retry `attempt` (1-based): `base_ms * 2^(attempt-1)`, capped.
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::{DynamicImage, RgbaImage};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures_before_success: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl VisionBackend for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }
        async fn verify(&self) -> Result<(), BackendError> {
            Ok(())
        }
        async fn transcribe(&self, n: usize, _p: &str, _i: &EncodedPage) -> Result<String, BackendError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(BackendError::Request("503".into()))
            } else {
                Ok(format!("```markdown\nconteúdo {n}\n```"))
            }
        }
    }

    struct Hangs;

    #[async_trait]
    impl VisionBackend for Hangs {
        fn name(&self) -> &str {
            "hangs"
        }
        async fn verify(&self) -> Result<(), BackendError> {
            Ok(())
        }
        async fn transcribe(&self, _n: usize, _p: &str, _i: &EncodedPage) -> Result<String, BackendError> {
            sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    fn pages(n: usize) -> Vec<PageImage> {
        (1..=n)
            .map(|page_num| PageImage {
                page_num,
                image: Ok(DynamicImage::ImageRgba8(RgbaImage::new(2, 2))),
            })
            .collect()
    }

    fn fast_config(max_retries: u32) -> ConversionConfig {
        ConversionConfig::builder()
            .max_retries(max_retries)
            .retry_backoff_ms(1)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let backend = Flaky {
            failures_before_success: 1,
            calls: AtomicU32::new(0),
        };
        let doc = run_cloud_structuring(&backend, &pages(1), Stage::CloudFallback, &fast_config(1), None)
            .await
            .unwrap();
        assert_eq!(doc.pages[0].status, PageStatus::Ok);
        assert_eq!(doc.pages[0].retries, 1);
        assert_eq!(doc.markdown, "\n\n# PÁGINA 1\n\nconteúdo 1");
    }

    #[tokio::test]
    async fn exhausted_retries_fail_the_run_when_no_page_is_ok() {
        let backend = Flaky {
            failures_before_success: u32::MAX,
            calls: AtomicU32::new(0),
        };
        let err = run_cloud_structuring(&backend, &pages(2), Stage::CloudFallback, &fast_config(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AttemptError::NoUsablePages { total: 2, .. }));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_becomes_api_error() {
        let config = ConversionConfig::builder()
            .max_retries(0)
            .api_timeout_secs(120)
            .build()
            .unwrap();
        let result = process_page(&Hangs, &pages(1)[0], &config).await;
        assert_eq!(result.status, PageStatus::ExtractionError);
        assert!(result
            .section()
            .contains("# ERRO DE API NA PÁGINA 1: timed out after 120s"));
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff_delay(500, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(500, 3), Duration::from_millis(2000));
        assert_eq!(backoff_delay(500, 70), Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(backoff_delay(u64::MAX, u32::MAX), Duration::from_millis(MAX_BACKOFF_MS));
    }

    #[tokio::test]
    async fn render_failure_is_not_sent() {
        let backend = Flaky {
            failures_before_success: 0,
            calls: AtomicU32::new(0),
        };
        let mut ps = pages(2);
        ps[1].image = Err("oom".into());
        let doc = run_cloud_structuring(&backend, &ps, Stage::CloudUpgrade, &fast_config(0), None)
            .await
            .unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(doc.pages[1].status, PageStatus::ExtractionError);
    }
}
