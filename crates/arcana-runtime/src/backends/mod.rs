//! Narrative backend abstractions.
//!
//! Backends are selected by an ordered, statically-known list of tagged
//! variants — `Primary`, `Secondary`, then the deterministic
//! `LocalComposer` — never by runtime reflection over provider shapes. The
//! HTTP adapters live behind cargo features; the local composer is always
//! available and is the final fallback.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::prompt::PromptContract;

pub mod local;
pub mod secrets;

#[cfg(feature = "anthropic")]
mod anthropic;

#[cfg(feature = "openai")]
mod openai;

pub use local::LocalComposer;
pub use secrets::ApiKey;

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicBackend, ANTHROPIC_API_KEY_ENV};

#[cfg(feature = "openai")]
pub use openai::{OpenAiBackend, OPENAI_API_KEY_ENV};

/// Errors from narrative backends. All of these classify as transport
/// failures to the orchestrator; quality rejection is decided by the gate,
/// not the backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),
}

impl BackendError {
    /// Whether a retry inside the same attempt can plausibly help.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::RateLimited { .. } | BackendError::HttpError(_) => true,
            BackendError::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Ordered backend tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Primary,
    Secondary,
    LocalComposer,
}

/// One generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub contract: &'a PromptContract,
    pub max_tokens: u32,
    pub timeout: Duration,
}

/// Token usage from a generation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A successful generation.
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    pub usage: TokenUsage,
    pub model: String,
}

/// A narrative generation backend.
///
/// Adapters may reformat the prompt contract for their wire format but must
/// preserve all required facts: the full card list, positions, and
/// orientations.
#[async_trait]
pub trait NarrativeBackend: Send + Sync {
    /// Stable identifier recorded in telemetry and on accepted readings.
    fn id(&self) -> &str;

    /// Which tier of the ordered list this backend occupies.
    fn kind(&self) -> BackendKind;

    /// Generate a candidate narrative.
    async fn generate(
        &self,
        request: GenerationRequest<'_>,
    ) -> Result<GenerationResponse, BackendError>;

    /// Cheap liveness check.
    async fn health_check(&self) -> bool {
        true
    }

    /// Estimate tokens for a prompt.
    fn estimate_tokens(&self, text: &str) -> u32 {
        // Simple estimate: ~4 chars per token
        (text.len() / 4) as u32
    }
}
