//! OpenAI-compatible chat-completions backend.
//!
//! The secondary hosted backend. Works against any endpoint speaking the
//! chat-completions wire format, which also covers most self-hosted
//! gateways. Retry behavior matches the primary backend.

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

/// Environment variable name for the OpenAI API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

const DEFAULT_MODEL: &str = "gpt-4o";

/// OpenAI-compatible narrative backend.
pub struct OpenAiBackend {
    api_key: ApiKey,
    base_url: String,
    model: String,
    kind: BackendKind,
    retry: RetryConfig,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("api_key", &self.api_key)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("kind", &self.kind)
            .finish()
    }
}

impl OpenAiBackend {
    /// Create a backend with an explicit API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_key(ApiKey::new(api_key))
    }

    /// Create from the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self, BackendError> {
        Ok(Self::with_key(ApiKey::from_env(OPENAI_API_KEY_ENV)?))
    }

    fn with_key(api_key: ApiKey) -> Self {
        Self {
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            model: DEFAULT_MODEL.to_string(),
            kind: BackendKind::Secondary,
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
        body: &ChatRequest,
        timeout: Duration,
    ) -> Result<GenerationResponse, BackendError> {
        let client = self.get_client();

        let response = client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.reveal())
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
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::ParseError(e.to_string()))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BackendError::ParseError("empty choices".to_string()))?;

        Ok(GenerationResponse {
            text,
            usage: TokenUsage {
                prompt_tokens: body.usage.prompt_tokens,
                completion_tokens: body.usage.completion_tokens,
            },
            model: body.model,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    model: String,
    usage: ChatUsage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait]
impl NarrativeBackend for OpenAiBackend {
    fn id(&self) -> &str {
        "openai"
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn generate(
        &self,
        request: GenerationRequest<'_>,
    ) -> Result<GenerationResponse, BackendError> {
        let body = ChatRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: BASE_READER_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: render_user_prompt(request.contract),
                },
            ],
        };

        let send = || async { self.send_once(&body, request.timeout).await };
        send.retry(
            ExponentialBuilder::default()
                .with_min_delay(self.retry.min_delay)
                .with_max_times(self.retry.max_retries),
        )
        .when(|e: &BackendError| e.is_transient())
        .notify(|e: &BackendError, after: Duration| {
            tracing::warn!(error = %e, ?after, "retrying openai call");
        })
        .await
    }

    async fn health_check(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_identity_defaults_to_secondary() {
        let backend = OpenAiBackend::new("test-key");
        assert_eq!(backend.id(), "openai");
        assert_eq!(backend.kind(), BackendKind::Secondary);
    }

    #[test]
    fn api_key_not_in_debug_output() {
        let secret = "sk-super-secret";
        let backend = OpenAiBackend::new(secret);
        let debug = format!("{:?}", backend);
        assert!(!debug.contains(secret));
    }

    #[test]
    fn builder_overrides_model_and_base_url() {
        let backend = OpenAiBackend::new("k")
            .with_model("gpt-4o-mini")
            .with_base_url("https://gateway.example/v1");
        assert_eq!(backend.model, "gpt-4o-mini");
        assert_eq!(backend.base_url, "https://gateway.example/v1");
    }
}
