//! Cloud vision backends: page image + prompt in, Markdown out.
//!
//! Two production backends:
//!
//! * [`GeminiBackend`] talks to the Gemini REST API with an explicit API key.
//! * [`ProviderBackend`] wraps any `edgequake-llm` vision provider (OpenAI,
//!   Anthropic, Ollama, …).
//!
//! [`resolve_backend`] picks one from the configuration and verifies its
//! credentials under the API timeout. [`session_backend`] keeps that answer
//! for the lifetime of the config, so a batch checks once. A failed check
//! disables cloud extraction for the session instead of failing every page
//! later.

use crate::config::ConversionConfig;
use crate::error::BackendError;
use crate::pipeline::encode::EncodedPage;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default Gemini REST endpoint.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model when a named provider is used without `--model`.
const DEFAULT_PROVIDER_MODEL: &str = "gpt-4.1-nano";

/// A generative-AI backend that can read page images.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    /// Short label for logs and reports.
    fn name(&self) -> &str;

    /// Cheap credential check, run once per session before the first page.
    async fn verify(&self) -> Result<(), BackendError>;

    /// Transcribe and structure one page.
    async fn transcribe(
        &self,
        page_num: usize,
        prompt: &str,
        image: &EncodedPage,
    ) -> Result<String, BackendError>;
}

// ── Gemini REST ──────────────────────────────────────────────────────────────

/// Gemini `generateContent` over HTTPS.
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    label: String,
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            label: format!("gemini/{model}"),
            model,
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    /// Point at a different endpoint (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl VisionBackend for GeminiBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn verify(&self) -> Result<(), BackendError> {
        let url = format!("{}/v1beta/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| BackendError::Request(format!("model listing failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status.as_u16(), &body))
    }

    async fn transcribe(
        &self,
        page_num: usize,
        prompt: &str,
        image: &EncodedPage,
    ) -> Result<String, BackendError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let request = serde_json::json!({
            "contents": [{
                "parts": [
                    { "text": prompt },
                    { "inline_data": { "mime_type": image.mime_type, "data": image.data_b64 } }
                ]
            }]
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Request(format!("reading response: {e}")))?;
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &body));
        }

        let text = extract_text(&body)?;
        debug!("Page {}: {} chars from {}", page_num, text.len(), self.label);
        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

/// Concatenate the text parts of the first candidate.
fn extract_text(body: &str) -> Result<String, BackendError> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| BackendError::Request(format!("malformed response: {e}")))?;

    if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(BackendError::Blocked(reason));
    }

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        return Ok(String::new());
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    match candidate.finish_reason.as_deref() {
        Some(reason @ ("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT"))
            if text.trim().is_empty() =>
        {
            Err(BackendError::Blocked(reason.to_string()))
        }
        _ => Ok(text),
    }
}

fn classify_status(status: u16, body: &str) -> BackendError {
    let snippet: String = body.chars().take(300).collect();
    match status {
        401 | 403 => BackendError::Auth(format!("HTTP {status}: {snippet}")),
        400 if body.contains("API_KEY_INVALID") => {
            BackendError::Auth(format!("HTTP {status}: {snippet}"))
        }
        _ => BackendError::Request(format!("HTTP {status}: {snippet}")),
    }
}

// ── edgequake-llm providers ──────────────────────────────────────────────────

/// Any `edgequake-llm` provider that accepts image attachments.
pub struct ProviderBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }

    fn options() -> CompletionOptions {
        CompletionOptions {
            temperature: Some(0.1),
            max_tokens: Some(8192),
            ..Default::default()
        }
    }
}

#[async_trait]
impl VisionBackend for ProviderBackend {
    fn name(&self) -> &str {
        &self.label
    }

    /// Providers resolve their own keys at construction; nothing to check.
    async fn verify(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn transcribe(
        &self,
        page_num: usize,
        prompt: &str,
        image: &EncodedPage,
    ) -> Result<String, BackendError> {
        let messages = vec![ChatMessage::user_with_images(
            prompt,
            vec![image.to_image_data()],
        )];
        let response = self
            .provider
            .chat(&messages, Some(&Self::options()))
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        debug!(
            "Page {}: {} input tokens, {} output tokens",
            page_num, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

// ── Resolution ───────────────────────────────────────────────────────────────

/// The session's cloud backend: resolved and verified on the first call for
/// this config, then reused for every later document.
pub async fn session_backend(config: &ConversionConfig) -> Option<Arc<dyn VisionBackend>> {
    config
        .cloud_session()
        .get_or_init(|| resolve_backend(config))
        .await
        .clone()
}

/// Pick the cloud backend for this run and verify its credentials.
///
/// Precedence: injected backend, then explicit credential (Gemini), then a
/// named `edgequake-llm` provider. Returns `None` when nothing is configured,
/// or when the check fails or outlasts `api_timeout_secs`.
pub async fn resolve_backend(config: &ConversionConfig) -> Option<Arc<dyn VisionBackend>> {
    if !config.has_cloud_source() {
        debug!("No cloud backend configured");
        return None;
    }

    let backend: Arc<dyn VisionBackend> = if let Some(ref injected) = config.vision_backend {
        Arc::clone(injected)
    } else if let Some(key) = config.credential.as_deref().filter(|k| !k.trim().is_empty()) {
        Arc::new(GeminiBackend::new(key.trim(), config.cloud_model()))
    } else {
        let name = config.provider_name.as_deref()?;
        let model = config.model.as_deref().unwrap_or(DEFAULT_PROVIDER_MODEL);
        match ProviderFactory::create_llm_provider(name, model) {
            Ok(provider) => Arc::new(ProviderBackend::new(provider, format!("{name}/{model}"))),
            Err(e) => {
                warn!("Provider '{}' could not be created: {} (cloud disabled)", name, e);
                return None;
            }
        }
    };

    let limit = Duration::from_secs(config.api_timeout_secs);
    let outcome = match tokio::time::timeout(limit, backend.verify()).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout(config.api_timeout_secs)),
    };
    match outcome {
        Ok(()) => {
            info!("Cloud backend '{}' available", backend.name());
            Some(backend)
        }
        Err(e) => {
            warn!(
                "Cloud backend '{}' failed its check: {} (continuing local-only)",
                backend.name(),
                e
            );
            None
        }
    }
}
