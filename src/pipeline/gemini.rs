//! Gemini `generateContent` invocation with key rotation and retry.
//!
//! This module turns a prompt (plus an optional page image) into the model's
//! reply text. It is intentionally thin: all prompt wording lives in
//! [`crate::prompts`] and all reply interpretation in
//! [`crate::pipeline::parse`].
//!
//! ## Retry Strategy
//!
//! HTTP 429 and 5xx responses are transient: a rate-limited key or an
//! overloaded backend. Each attempt draws a fresh key from the
//! [`KeyRotator`], and between attempts the client waits
//! `2000 ms × 2^attempt`: 2 s → 4 s → 8 s, at most [`MAX_RETRIES`] times.
//! Any other status, and any transport failure, is returned immediately.
//!
//! Both the HTTP layer ([`Transport`]) and the wait ([`DelayFn`]) are
//! injectable so the retry loop can be tested without a network or timers.

use crate::config::AssistantConfig;
use crate::error::{is_retryable_status, QuizError};
use crate::keys::KeyRotator;
use crate::pipeline::encode::split_data_url;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Retries after the first attempt.
pub const MAX_RETRIES: u32 = 3;

/// Backoff before the first retry; doubles each time.
pub const BASE_BACKOFF_MS: u64 = 2000;

/// Finish reasons that mean the answer was withheld.
const BLOCKING_FINISH_REASONS: [&str; 4] = ["SAFETY", "BLOCKLIST", "PROHIBITED_CONTENT", "SPII"];

/// Wait before retry number `attempt + 1` (0-based `attempt`).
pub fn backoff_for_attempt(attempt: u32) -> Duration {
    Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt))
}

// ── Transport ────────────────────────────────────────────────────────────

/// Status and body of an HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// The single HTTP operation the invoker needs.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` as JSON to `url` and return status and body text.
    ///
    /// Only failures that produce no HTTP status are errors.
    async fn post_json(&self, url: &str, body: &Value) -> Result<HttpReply, QuizError>;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, QuizError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QuizError::Http(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<HttpReply, QuizError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            // Strip the URL: it carries the API key as a query parameter.
            .map_err(|e| QuizError::Http(e.without_url().to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| QuizError::Http(e.without_url().to_string()))?;
        Ok(HttpReply { status, body })
    }
}

/// Injectable wait used between retries.
pub type DelayFn = Arc<dyn Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync>;

/// [`DelayFn`] backed by `tokio::time::sleep`.
pub fn tokio_delay() -> DelayFn {
    Arc::new(|d| Box::pin(tokio::time::sleep(d)))
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

// ── Request ──────────────────────────────────────────────────────────────

/// One model call.
#[derive(Debug, Clone)]
pub struct InvokeRequest<'a> {
    pub prompt: &'a str,
    /// Base64 image, with or without a `data:<mime>;base64,` prefix.
    pub image: Option<&'a str>,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// Build the JSON body for a request.
pub fn build_request_body(request: &InvokeRequest<'_>) -> Value {
    let mut parts = vec![RequestPart::Text {
        text: request.prompt,
    }];
    if let Some(image) = request.image {
        let (mime_type, data) = split_data_url(image);
        parts.push(RequestPart::InlineData {
            inline_data: InlineData { mime_type, data },
        });
    }

    let body = GenerateRequest {
        contents: [RequestContent { parts }],
        generation_config: GenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_output_tokens,
        },
    };
    // Serialising plain structs of strings and numbers cannot fail.
    serde_json::to_value(body).unwrap_or(Value::Null)
}

// ── Client ───────────────────────────────────────────────────────────────

/// Gemini client drawing keys from a shared [`KeyRotator`].
#[derive(Clone)]
pub struct GeminiClient {
    endpoint: String,
    keys: Arc<KeyRotator>,
    transport: Arc<dyn Transport>,
    delay: DelayFn,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("endpoint", &self.endpoint)
            .field("keys", &self.keys)
            .field("transport", &"<dyn Transport>")
            .finish()
    }
}

impl GeminiClient {
    /// Client using `reqwest` and real sleeps.
    pub fn new(config: &AssistantConfig, keys: Arc<KeyRotator>) -> Result<Self, QuizError> {
        let transport = ReqwestTransport::new(Duration::from_secs(config.request_timeout_secs))?;
        Ok(Self::with_transport(config, keys, Arc::new(transport), tokio_delay()))
    }

    /// Client with an explicit transport and delay, e.g. for tests.
    pub fn with_transport(
        config: &AssistantConfig,
        keys: Arc<KeyRotator>,
        transport: Arc<dyn Transport>,
        delay: DelayFn,
    ) -> Self {
        Self {
            endpoint: config.endpoint(),
            keys,
            transport,
            delay,
        }
    }

    /// The key pool this client draws from.
    pub fn keys(&self) -> &Arc<KeyRotator> {
        &self.keys
    }

    /// Send one request, retrying 429/5xx with backoff, and return the first
    /// candidate's text.
    pub async fn invoke(&self, request: &InvokeRequest<'_>) -> Result<String, QuizError> {
        let start = Instant::now();
        let body = build_request_body(request);

        let mut attempt: u32 = 0;
        loop {
            let key = self.keys.next_key()?;
            let url = format!("{}?key={}", self.endpoint, key);
            debug!(
                "POST {} (attempt {}/{}, prompt {} chars, image: {})",
                self.endpoint,
                attempt + 1,
                MAX_RETRIES + 1,
                request.prompt.len(),
                request.image.is_some()
            );

            let reply = self.transport.post_json(&url, &body).await?;

            if (200..300).contains(&reply.status) {
                let text = extract_text(&reply.body)?;
                debug!(
                    "Reply: {} chars after {} attempt(s), {:?}",
                    text.len(),
                    attempt + 1,
                    start.elapsed()
                );
                return Ok(text);
            }

            if is_retryable_status(reply.status) && attempt < MAX_RETRIES {
                let backoff = backoff_for_attempt(attempt);
                warn!(
                    "HTTP {}: retry {}/{} after {}ms with next key",
                    reply.status,
                    attempt + 1,
                    MAX_RETRIES,
                    backoff.as_millis()
                );
                (self.delay)(backoff).await;
                attempt += 1;
                continue;
            }

            return Err(QuizError::ApiError {
                status: reply.status,
                message: error_message(&reply.body),
            });
        }
    }
}

/// Server-provided error message, or the raw body when it is not the
/// standard `{error:{message}}` envelope.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => env.error.message,
        Err(_) => body.trim().to_string(),
    }
}

/// Pull the first candidate's text out of a success envelope.
fn extract_text(body: &str) -> Result<String, QuizError> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| QuizError::MalformedResponse(format!("invalid JSON envelope: {e}")))?;

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(QuizError::ContentBlocked { reason });
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| QuizError::MalformedResponse("response has no candidates".into()))?;

    let texts: Vec<String> = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if texts.is_empty() {
        if let Some(reason) = candidate
            .finish_reason
            .filter(|r| BLOCKING_FINISH_REASONS.contains(&r.as_str()))
        {
            return Err(QuizError::ContentBlocked { reason });
        }
        return Err(QuizError::MalformedResponse(
            "first candidate has no text content".into(),
        ));
    }

    Ok(texts.concat())
}
