//! Anthropic Messages API backend.
//!
//! The primary hosted narrative backend. Transient failures (429, 5xx,
//! connection resets) are retried with exponential backoff inside the
//! attempt; anything that survives the retries surfaces to the
//! orchestrator as a transport failure.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    secrets::ApiKey, BackendError, BackendKind, GenerationRequest, GenerationResponse,
    NarrativeBackend, TokenUsage,
};
use crate::config::RetryConfig;
use crate::prompt::{render_user_prompt, BASE_READER_PROMPT};

/// Environment variable name for the Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250514";

/// Anthropic narrative backend.
pub struct AnthropicBackend {
    api_key: ApiKey,
    base_url: String,
    model: String,
    kind: BackendKind,
    retry: RetryConfig,
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend")
            .field("api_key", &self.api_key)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("kind", &self.kind)
            .finish()
    }
}

impl AnthropicBackend {
    /// Create a backend with an explicit API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_key(ApiKey::new(api_key))
    }

    /// Create from the `ANTHROPIC_API_KEY` environment variable.
    pub fn from_env() -> Result<Self, BackendError> {
        Ok(Self::with_key(ApiKey::from_env(ANTHROPIC_API_KEY_ENV)?))
    }

    fn with_key(api_key: ApiKey) -> Self {
        Self {
            api_key,
            base_url: "https://api.anthropic.com/v1".to_string(),
            model: DEFAULT_MODEL.to_string(),
            kind: BackendKind::Primary,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_kind(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn get_client(&self) -> &reqwest::Client {
        static CLIENT: std::sync::OnceLock<reqwest::Client> = std::sync::OnceLock::new();
        CLIENT.get_or_init(|| {
            reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default()
        })
    }

    async fn send_once(
        &self,
        body: &AnthropicRequest,
        timeout: Duration,
    ) -> Result<GenerationResponse, BackendError> {
        let client = self.get_client();

        let response = client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.api_key.reveal())
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(timeout)
                } else {
                    BackendError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();

        if status == 401 || status == 403 {
            return Err(BackendError::AuthError);
        }

        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(BackendError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let error_body = response
                .json::<AnthropicErrorEnvelope>()
                .await
                .map_err(|e| BackendError::ParseError(e.to_string()))?;

            return Err(BackendError::ApiError {
                status: status.as_u16(),
                message: error_body.error.message,
            });
        }

        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| BackendError::ParseError(e.to_string()))?;

        let text = body
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(GenerationResponse {
            text,
            usage: TokenUsage {
                prompt_tokens: body.usage.input_tokens,
                completion_tokens: body.usage.output_tokens,
            },
            model: body.model,
        })
    }
}

/// Anthropic API request format.
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

/// Anthropic API response format.
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    model: String,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    #[allow(dead_code)] // Required for deserialization, not read directly
    type_: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorEnvelope {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    #[serde(rename = "type")]
    #[allow(dead_code)] // Required for deserialization, not read directly
    type_: String,
    message: String,
}

#[async_trait]
impl NarrativeBackend for AnthropicBackend {
    fn id(&self) -> &str {
        "anthropic"
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn generate(
        &self,
        request: GenerationRequest<'_>,
    ) -> Result<GenerationResponse, BackendError> {
        let body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            system: BASE_READER_PROMPT.to_string(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: render_user_prompt(request.contract),
            }],
        };

        let send = || async { self.send_once(&body, request.timeout).await };
        send.retry(
            ExponentialBuilder::default()
                .with_min_delay(self.retry.min_delay)
                .with_max_times(self.retry.max_retries),
        )
        .when(|e: &BackendError| e.is_transient())
        .notify(|e: &BackendError, after: Duration| {
            tracing::warn!(error = %e, ?after, "retrying anthropic call");
        })
        .await
    }

    async fn health_check(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[async_trait]
impl crate::evaluation::EvaluationBackend for AnthropicBackend {
    fn id(&self) -> &str {
        "anthropic-scorer"
    }

    async fn score(
        &self,
        text: &str,
        rubric: &crate::evaluation::Rubric,
    ) -> Result<crate::evaluation::DimensionScores, BackendError> {
        let rubric_json = serde_json::to_string(rubric)
            .map_err(|e| BackendError::ParseError(e.to_string()))?;
        let body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: 200,
            system: crate::evaluation::SCORING_PROMPT.to_string(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: format!("Rubric:\n{rubric_json}\n\n<reading>\n{text}\n</reading>"),
            }],
        };

        let response = self.send_once(&body, Duration::from_secs(30)).await?;
        crate::evaluation::parse_scores(&response.text)
    }
}
