//! Completion client for OpenAI-compatible endpoints.
//!
//! Prompts are sent raw to `/completions` (not chat): exemplar files already
//! carry the model's chat template, so no message wrapping happens here.

use crate::models::{ConcordError, EngineConfig, EngineError, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Source of generated text.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Complete `prompt`, stopping before any of `stop`.
    async fn generate(&self, prompt: &str, stop: &[String], seed: u64) -> Result<String>;
}

/// Completion request payload.
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f64,
    seed: u64,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    completion_tokens: u32,
}

/// API error response (OpenAI-compatible).
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Result of one completion.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Generated text, trimmed
    pub text: String,
    /// Output tokens, when reported
    pub completion_tokens: u32,
}

/// Client for one completion endpoint.
///
/// Retries network failures, rate limits and server errors with exponential
/// backoff; authentication and not-found errors fail immediately.
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f64,
    timeout: Duration,
    max_retries: u32,
    total_completion_tokens: AtomicU64,
}

impl LlmClient {
    /// Create a new client from the engine settings.
    pub fn new(config: &EngineConfig, api_key: Option<String>) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ConcordError::Network)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout,
            max_retries: config.max_retries.max(1),
            total_completion_tokens: AtomicU64::new(0),
        })
    }

    /// Build headers for a request.
    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        if let Some(api_key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
                ConcordError::InvalidInput("API key contains invalid header characters".to_string())
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Run a completion request.
    pub async fn complete(&self, prompt: &str, stop: &[String], seed: u64) -> Result<Completion> {
        let request = CompletionRequest {
            model: &self.model,
            prompt,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            seed,
            stop,
        };

        let url = format!("{}/completions", self.base_url);
        let headers = self.headers()?;
        let mut last_error: Option<ConcordError> = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let backoff = match &last_error {
                    Some(ConcordError::RateLimited { retry_after_secs }) => {
                        retry_after_delay(*retry_after_secs)
                    }
                    _ => Duration::from_secs(2u64.pow(attempt - 1)),
                };
                debug!(
                    attempt = attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "Retrying completion request"
                );
                tokio::time::sleep(backoff).await;
            }

            let response = match self
                .client
                .post(&url)
                .headers(headers.clone())
                .json(&request)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(if e.is_timeout() {
                        ConcordError::Timeout(self.timeout)
                    } else {
                        ConcordError::Network(e)
                    });
                    continue;
                }
            };

            let status = response.status().as_u16();

            if status == 429 {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<f64>().ok())
                    .unwrap_or(1.0);
                last_error = Some(ConcordError::RateLimited {
                    retry_after_secs: retry_after,
                });
                continue;
            }

            if !response.status().is_success() {
                let body = response.text().await.unwrap_or_default();
                let error = match status {
                    401 => EngineError::AuthenticationFailed,
                    404 => EngineError::ModelNotFound(self.model.clone()),
                    _ => EngineError::ApiError {
                        status,
                        message: serde_json::from_str::<ApiErrorResponse>(&body)
                            .map(|e| e.error.message)
                            .unwrap_or(body),
                    },
                };
                let error = ConcordError::Engine(error);
                if !error.is_retryable() {
                    return Err(error);
                }
                last_error = Some(error);
                continue;
            }

            let body = response.text().await.map_err(ConcordError::Network)?;
            let (text, tokens) = parse_completion(&body)?;
            self.total_completion_tokens
                .fetch_add(u64::from(tokens), Ordering::Relaxed);

            return Ok(Completion {
                text,
                completion_tokens: tokens,
            });
        }

        Err(match last_error {
            Some(e) if self.max_retries == 1 => e,
            Some(e) => ConcordError::Engine(EngineError::MaxRetriesExceeded {
                attempts: self.max_retries,
                last_error: e.to_string(),
            }),
            None => ConcordError::Internal("no completion attempt was made".to_string()),
        })
    }

    /// Output tokens generated so far.
    pub fn total_completion_tokens(&self) -> u64 {
        self.total_completion_tokens.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Generator for LlmClient {
    async fn generate(&self, prompt: &str, stop: &[String], seed: u64) -> Result<String> {
        self.complete(prompt, stop, seed).await.map(|c| c.text)
    }
}

/// Upper bound on a server-requested wait.
const MAX_RETRY_AFTER_SECS: f64 = 60.0;

/// Wait for a `retry-after` value. Negative or non-finite values wait one second.
fn retry_after_delay(secs: f64) -> Duration {
    if secs.is_finite() && secs >= 0.0 {
        Duration::from_secs_f64(secs.min(MAX_RETRY_AFTER_SECS))
    } else {
        Duration::from_secs(1)
    }
}

/// Text and output-token count of a successful response body.
fn parse_completion(body: &str) -> Result<(String, u32)> {
    let response: CompletionResponse = serde_json::from_str(body).map_err(|e| {
        ConcordError::Engine(EngineError::InvalidResponse(format!(
            "Failed to parse response: {e}"
        )))
    })?;

    let text = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.text.trim().to_string())
        .ok_or_else(|| {
            ConcordError::Engine(EngineError::InvalidResponse(
                "No choices in response".to_string(),
            ))
        })?;

    Ok((text, response.usage.map_or(0, |u| u.completion_tokens)))
}
