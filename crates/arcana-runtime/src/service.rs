//! The reading service.
//!
//! Ties the pipeline together: quota check, deterministic draw, pattern
//! analysis, backend orchestration, evaluation gate, persistence. Policy:
//! quality and safety fail closed (nothing is surfaced that did not pass
//! the structural gate, nothing blocked by the evaluation gate is ever
//! surfaced); persistence and telemetry fail open (a querent still
//! receives an accepted reading when storage or logging misbehaves).

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use arcana_core::{
    analyze, assert_redraw_consistency, draw, CatalogError, CatalogRegistry, DrawError, Reading,
    ReadingState, RitualSeed,
};

use crate::backends::NarrativeBackend;
use crate::config::RuntimeConfig;
use crate::evaluation::{EvaluationBackend, EvaluationGate};
use crate::orchestrator::{BackendOrchestrator, DrawContext, OrchestratorError};
use crate::prompt::ReferencePassage;
use crate::store::{MemoryReadingStore, ReadingStore};
use crate::stream::{EventSender, ReadingEvent, ReadingPhase};
use crate::telemetry::{ReadingTelemetry, TelemetrySink, ThresholdsSnapshot, TracingSink};
use crate::usage::{month_key, MemoryUsageLedger, UsageLedger};

/// Errors surfaced to reading consumers.
#[derive(Error, Debug)]
pub enum ReadingError {
    #[error("monthly reading quota exceeded ({used}/{limit})")]
    QuotaExceeded { used: u32, limit: u32 },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Draw(#[from] DrawError),

    #[error("all narrative backends exhausted")]
    Exhausted,

    #[error("content blocked: {reason}")]
    Blocked { reason: String },

    #[error("reading canceled")]
    Canceled,

    #[error("reading task failed: {0}")]
    Task(String),
}

/// Raw ritual inputs from the client.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RitualInputs {
    pub knock_events: Vec<i64>,
    pub cut_index: u32,
}

/// One reading request.
#[derive(Debug, Clone)]
pub struct ReadingRequest {
    pub user_id: String,
    pub deck_id: String,
    pub spread_key: String,
    pub question: String,
    pub ritual: RitualInputs,
    pub references: Vec<ReferencePassage>,
}

/// Handle for a spawned reading job.
///
/// The handle is separately addressable: cancellation can be signaled from
/// any task holding a clone of the token, independent of the context that
/// submitted the request.
pub struct ReadingJob {
    pub id: Uuid,
    pub events: mpsc::Receiver<ReadingEvent>,
    cancel: CancellationToken,
    handle: JoinHandle<Result<Reading, ReadingError>>,
}

impl ReadingJob {
    /// A token that cancels this job from anywhere.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the terminal result.
    pub async fn join(self) -> Result<Reading, ReadingError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(ReadingError::Task(e.to_string())),
        }
    }
}

struct ServiceInner {
    registry: Arc<CatalogRegistry>,
    orchestrator: BackendOrchestrator,
    evaluation: EvaluationGate,
    store: Arc<dyn ReadingStore>,
    ledger: Arc<dyn UsageLedger>,
    sinks: Vec<Arc<dyn TelemetrySink>>,
    config: RuntimeConfig,
}

/// The reading-generation service. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct ReadingService {
    inner: Arc<ServiceInner>,
}

impl ReadingService {
    pub fn builder() -> ReadingServiceBuilder {
        ReadingServiceBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Spawn a reading as a background job with its own handle.
    pub fn submit(&self, request: ReadingRequest) -> ReadingJob {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let (events, receiver) = EventSender::channel(64);

        let service = self.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            service
                .generate_with_id(id, request, token, Some(events))
                .await
        });

        ReadingJob {
            id,
            events: receiver,
            cancel,
            handle,
        }
    }

    /// Run a reading to its terminal state in the calling task.
    pub async fn generate(
        &self,
        request: ReadingRequest,
        cancel: CancellationToken,
        events: Option<EventSender>,
    ) -> Result<Reading, ReadingError> {
        self.generate_with_id(Uuid::new_v4(), request, cancel, events)
            .await
    }

    async fn generate_with_id(
        &self,
        reading_id: Uuid,
        request: ReadingRequest,
        cancel: CancellationToken,
        events: Option<EventSender>,
    ) -> Result<Reading, ReadingError> {
        let inner = &self.inner;

        // Quota first. The ledger increment is atomic, so concurrent
        // requests each see a distinct count; ledger outages fail open.
        let period = month_key(Utc::now());
        match inner.ledger.increment(&request.user_id, &period).await {
            Ok(count) if count > inner.config.monthly_reading_limit => {
                return Err(ReadingError::QuotaExceeded {
                    used: count,
                    limit: inner.config.monthly_reading_limit,
                });
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(error = %error, "usage ledger unavailable; allowing reading");
            }
        }

        let deck = inner.registry.deck(&request.deck_id)?;
        let spread = inner.registry.spread(&request.spread_key)?;

        let seed = RitualSeed::new(
            request.ritual.knock_events.clone(),
            request.ritual.cut_index,
            request.question.clone(),
            request.deck_id.clone(),
        );
        let drawn = draw::draw(&seed, deck, spread)?;
        // Determinism is an invariant, not a hope.
        assert_redraw_consistency(&seed, deck, spread, &drawn);

        if let Some(events) = &events {
            events.phase(ReadingPhase::Analyzing);
        }
        let patterns = analyze(&drawn);

        let mut telemetry = ReadingTelemetry::new(
            reading_id,
            spread.key.clone(),
            ThresholdsSnapshot {
                gate: inner.config.gate.clone(),
                evaluation: inner.config.evaluation.thresholds,
            },
        );

        if let Some(events) = &events {
            events.phase(ReadingPhase::Drafting);
        }
        let ctx = DrawContext {
            deck,
            spread,
            drawn: &drawn,
            patterns: &patterns,
            question: &request.question,
            references: &request.references,
        };
        let draft = match inner.orchestrator.run(ctx, &cancel, &mut telemetry).await {
            Ok(draft) => draft,
            Err(error) => {
                telemetry.finish();
                self.record_telemetry(&telemetry);
                return match error {
                    OrchestratorError::Canceled => Err(ReadingError::Canceled),
                    OrchestratorError::Exhausted { .. } | OrchestratorError::NoBackends => {
                        let failed = Reading {
                            id: reading_id,
                            state: ReadingState::Failed,
                            spread_key: spread.key.clone(),
                            drawn_cards: drawn.clone(),
                            question: request.question.clone(),
                            narrative_text: String::new(),
                            accepted_backend_id: None,
                            structural_gate_result: None,
                            evaluation_gate_result: None,
                            prompt_version: None,
                            created_at: Utc::now(),
                        };
                        self.persist(&failed).await;
                        Err(ReadingError::Exhausted)
                    }
                };
            }
        };

        // Stream the accepted narrative. Gating already ran on the full
        // text; chunking here is presentation only.
        if let Some(events) = &events {
            events.phase(ReadingPhase::Polishing);
            for paragraph in draft.text.split("\n\n").filter(|p| !p.trim().is_empty()) {
                events.chunk(paragraph);
            }
        }

        let outcome = inner.evaluation.evaluate(&draft.text).await;
        telemetry.finish();
        self.record_telemetry(&telemetry);

        let evaluation_json = match serde_json::to_value(&outcome) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(error = %error, "failed to serialize evaluation outcome");
                None
            }
        };

        if outcome.is_blocked() {
            let reason = outcome
                .reason
                .clone()
                .unwrap_or_else(|| "blocked by evaluation gate".to_string());

            // Quarantine: the narrative is retained on the failed record for
            // review but is never surfaced to the querent.
            let quarantined = Reading {
                id: reading_id,
                state: ReadingState::Failed,
                spread_key: spread.key.clone(),
                drawn_cards: drawn.clone(),
                question: request.question.clone(),
                narrative_text: draft.text.clone(),
                accepted_backend_id: Some(draft.backend_id.clone()),
                structural_gate_result: Some(draft.gate_result.clone()),
                evaluation_gate_result: evaluation_json,
                prompt_version: Some(draft.prompt_meta.version.clone()),
                created_at: Utc::now(),
            };
            self.persist(&quarantined).await;

            return Err(ReadingError::Blocked { reason });
        }

        let reading = Reading {
            id: reading_id,
            state: ReadingState::Accepted,
            spread_key: spread.key.clone(),
            drawn_cards: drawn,
            question: request.question,
            narrative_text: draft.text,
            accepted_backend_id: Some(draft.backend_id),
            structural_gate_result: Some(draft.gate_result),
            evaluation_gate_result: evaluation_json,
            prompt_version: Some(draft.prompt_meta.version),
            created_at: Utc::now(),
        };
        self.persist(&reading).await;

        if let Some(events) = &events {
            events.done(reading.clone());
        }

        Ok(reading)
    }

    /// Persist fail-open: storage problems are logged, never surfaced.
    async fn persist(&self, reading: &Reading) {
        if let Err(error) = self.inner.store.put_reading(reading).await {
            tracing::warn!(
                reading_id = %reading.id,
                error = %error,
                "failed to persist reading; continuing"
            );
        }
    }

    /// Telemetry fail-open: sink problems are logged, never surfaced.
    fn record_telemetry(&self, telemetry: &ReadingTelemetry) {
        for sink in &self.inner.sinks {
            if let Err(error) = sink.record(telemetry) {
                tracing::warn!(error = %error, "telemetry sink failed; continuing");
            }
        }
    }
}

/// Builder for [`ReadingService`].
pub struct ReadingServiceBuilder {
    registry: Option<Arc<CatalogRegistry>>,
    backends: Vec<Arc<dyn NarrativeBackend>>,
    scorer: Option<Arc<dyn EvaluationBackend>>,
    store: Option<Arc<dyn ReadingStore>>,
    ledger: Option<Arc<dyn UsageLedger>>,
    sinks: Vec<Arc<dyn TelemetrySink>>,
    config: RuntimeConfig,
}

impl ReadingServiceBuilder {
    pub fn new() -> Self {
        Self {
            registry: None,
            backends: Vec::new(),
            scorer: None,
            store: None,
            ledger: None,
            sinks: Vec::new(),
            config: RuntimeConfig::default(),
        }
    }

    pub fn registry(mut self, registry: Arc<CatalogRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Append a backend; order is the fallback order.
    pub fn backend(mut self, backend: Arc<dyn NarrativeBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn scorer(mut self, scorer: Arc<dyn EvaluationBackend>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn store(mut self, store: Arc<dyn ReadingStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn ledger(mut self, ledger: Arc<dyn UsageLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<ReadingService, ReadingError> {
        let registry = self.registry.unwrap_or_else(|| {
            Arc::new(CatalogRegistry::builtin().unwrap_or_default())
        });
        if self.backends.is_empty() {
            return Err(ReadingError::Task(
                "at least one narrative backend is required".to_string(),
            ));
        }

        let orchestrator = BackendOrchestrator::new(self.backends, self.config.clone());
        let evaluation = EvaluationGate::new(self.scorer, self.config.evaluation.clone());

        let sinks = if self.sinks.is_empty() {
            vec![Arc::new(TracingSink) as Arc<dyn TelemetrySink>]
        } else {
            self.sinks
        };

        Ok(ReadingService {
            inner: Arc::new(ServiceInner {
                registry,
                orchestrator,
                evaluation,
                store: self
                    .store
                    .unwrap_or_else(|| Arc::new(MemoryReadingStore::new())),
                ledger: self
                    .ledger
                    .unwrap_or_else(|| Arc::new(MemoryUsageLedger::new())),
                sinks,
                config: self.config,
            }),
        })
    }
}

impl Default for ReadingServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
