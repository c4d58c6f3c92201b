//! # arcana-runtime
//!
//! Backend orchestration and evaluation for Arcana readings.
//!
//! `arcana-core` is fully deterministic and never talks to a model; this
//! crate owns everything that does:
//! - the prompt composer and its token-budget slimming,
//! - the ordered narrative backends (hosted adapters behind cargo
//!   features, plus the always-available deterministic local composer),
//! - the sequential attempt state machine with structural gating,
//! - the evaluation gate (deterministic safety backstop + model-assisted
//!   rubric scoring),
//! - telemetry, persistence traits, usage accounting, streaming events,
//!   and the [`ReadingService`] that wires it all together.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use arcana_runtime::{LocalComposer, ReadingRequest, ReadingService, RitualInputs};
//!
//! let service = ReadingService::builder()
//!     .backend(Arc::new(LocalComposer::new()))
//!     .build()?;
//!
//! let job = service.submit(ReadingRequest {
//!     user_id: "user-1".into(),
//!     deck_id: "rws".into(),
//!     spread_key: "three-card".into(),
//!     question: "What should I tend this week?".into(),
//!     ritual: RitualInputs { knock_events: vec![120, 480, 950], cut_index: 17 },
//!     references: vec![],
//! });
//!
//! let reading = job.join().await?;
//! ```

pub mod backends;
pub mod config;
pub mod evaluation;
pub mod orchestrator;
pub mod prompt;
pub mod service;
pub mod store;
pub mod stream;
pub mod telemetry;
pub mod usage;

// Re-export main types at crate root
pub use backends::{
    ApiKey, BackendError, BackendKind, GenerationRequest, GenerationResponse, LocalComposer,
    NarrativeBackend, TokenUsage,
};
pub use config::{EvaluationConfig, EvaluationThresholds, RetryConfig, RuntimeConfig};
pub use evaluation::{
    DimensionScores, EvaluationBackend, EvaluationDecision, EvaluationGate, EvaluationOutcome,
    Rubric,
};
pub use orchestrator::{
    AcceptedDraft, BackendOrchestrator, DrawContext, OrchestratorError,
};
pub use prompt::{
    PromptComposer, PromptContract, PromptMeta, ReferencePassage, PROMPT_VERSION,
};
pub use service::{
    ReadingError, ReadingJob, ReadingRequest, ReadingService, ReadingServiceBuilder, RitualInputs,
};
pub use store::{MemoryReadingStore, ReadingStore, StoreError};
pub use stream::{EventSender, ReadingEvent, ReadingPhase};
pub use telemetry::{
    AttemptOutcome, AttemptRecord, ReadingTelemetry, TelemetrySink, ThresholdsSnapshot,
    TracingSink,
};
pub use usage::{month_key, MemoryUsageLedger, UsageLedger};

#[cfg(feature = "anthropic")]
pub use backends::AnthropicBackend;

#[cfg(feature = "openai")]
pub use backends::OpenAiBackend;
