//! HTTP model executor.
//!
//! Talks to any endpoint implementing a minimal JSON contract:
//!
//! ```text
//! POST {base_url}/analyze
//! { "model": "...", "tier": "pro", "prompt": "...", "text": "..." }
//!
//! 200 OK
//! { "payload": { ... }, "input_tokens": 1200, "output_tokens": 800 }
//! ```
//!
//! Non-success statuses are mapped onto the `ModelError` taxonomy so the
//! retry orchestrator can tell transient failures from request errors.

use async_trait::async_trait;
use juris_abstraction::{ModelError, ModelExecutor, ModelOutput, Tier};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Executor backed by an HTTP analysis endpoint.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    /// Model/version tag sent with every request.
    model: String,
    /// Base URL without trailing slash.
    base_url: String,
    /// Optional bearer token.
    api_key: Option<String>,
    /// Client timeout, echoed in `ModelError::Timeout`.
    timeout: Duration,
    /// HTTP client for making requests.
    client: Client,
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    model: &'a str,
    tier: Tier,
    prompt: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    payload: serde_json::Value,
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl HttpExecutor {
    /// Creates an executor without authentication.
    ///
    /// # Errors
    /// Returns `ModelError::BadRequest` if the HTTP client cannot be built.
    pub fn new(model: String, base_url: String, timeout: Duration) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::BadRequest(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            timeout,
            client,
        })
    }

    /// Sends `Authorization: Bearer <api_key>` with every request.
    #[must_use]
    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.api_key = Some(api_key);
        self
    }

    fn map_transport_error(&self, err: &reqwest::Error) -> ModelError {
        if err.is_timeout() {
            ModelError::Timeout(self.timeout.as_millis() as u64)
        } else {
            ModelError::Network(err.to_string())
        }
    }

    /// Maps a non-success status onto the error taxonomy.
    fn map_status(status: StatusCode, tier: Tier, retry_after: Option<u64>, body: String) -> ModelError {
        match status.as_u16() {
            429 => ModelError::RateLimited { retry_after_secs: retry_after },
            402 => ModelError::QuotaExhausted { tier, message: Some(body) },
            401 | 403 => ModelError::Unauthorized(body),
            408 => ModelError::Timeout(0),
            s if status.is_server_error() => ModelError::Server { status: s, message: body },
            s => ModelError::BadRequest(format!("API error ({}): {}", s, body)),
        }
    }
}

#[async_trait]
impl ModelExecutor for HttpExecutor {
    async fn invoke(
        &self,
        text: &str,
        tier: Tier,
        prompt_template: &str,
    ) -> Result<ModelOutput, ModelError> {
        let url = format!("{}/analyze", self.base_url);
        debug!(url = %url, tier = %tier, text_len = text.len(), "HttpExecutor sending analysis request");

        let body = AnalyzeRequest { model: &self.model, tier, prompt: prompt_template, text };

        let mut request = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            error!(error = %e, "Failed to send analysis request");
            self.map_transport_error(&e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "Analysis endpoint returned error status");
            return Err(Self::map_status(status, tier, retry_after, error_text));
        }

        let parsed: AnalyzeResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse analysis response");
            ModelError::InvalidResponse(format!("Failed to parse response: {}", e))
        })?;

        Ok(ModelOutput {
            payload: parsed.payload,
            input_tokens: parsed.input_tokens,
            output_tokens: parsed.output_tokens,
        })
    }

    fn executor_id(&self) -> &str {
        &self.model
    }
}
