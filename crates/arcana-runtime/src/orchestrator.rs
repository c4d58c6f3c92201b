//! Backend orchestration state machine.
//!
//! One reading request drives one strictly sequential machine:
//!
//! ```text
//! Idle -> Attempting(i) -> { Accepted(i), Attempting(i+1), Exhausted }
//! ```
//!
//! Each attempt composes the prompt, invokes backend `i` under a timeout,
//! and runs the candidate through the structural gate. The result is
//! classified into exactly one of transport failure, quality rejection, or
//! acceptance. Failures advance to the next backend; acceptance is
//! terminal. The last backend is the deterministic local composer; if even
//! that is rejected the machine is exhausted and the request fails fatally
//! with no partial narrative. Cancellation is honored between and during
//! attempts and never advances the machine.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use arcana_core::patterns::PatternSet;
use arcana_core::{Deck, DrawnCard, GateResult, Spread, StructuralGate};

use crate::backends::{GenerationRequest, NarrativeBackend, TokenUsage};
use crate::config::RuntimeConfig;
use crate::prompt::{PromptComposer, PromptMeta, ReferencePassage};
use crate::telemetry::{AttemptOutcome, AttemptRecord, ReadingTelemetry};

/// Errors from the orchestrator.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("all {attempts} narrative backends exhausted without an accepted narrative")]
    Exhausted { attempts: usize },

    #[error("reading canceled")]
    Canceled,

    #[error("no narrative backends configured")]
    NoBackends,
}

/// Everything the orchestrator needs about one draw.
#[derive(Debug, Clone, Copy)]
pub struct DrawContext<'a> {
    pub deck: &'a Deck,
    pub spread: &'a Spread,
    pub drawn: &'a [DrawnCard],
    pub patterns: &'a PatternSet,
    pub question: &'a str,
    pub references: &'a [ReferencePassage],
}

/// The accepted narrative with the metadata of the attempt that produced
/// it. Prompt metadata here always originates from the winning attempt.
#[derive(Debug, Clone)]
pub struct AcceptedDraft {
    pub text: String,
    pub backend_id: String,
    pub model: String,
    pub gate_result: GateResult,
    pub prompt_meta: PromptMeta,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MachineState {
    Idle,
    Attempting(usize),
    Accepted(usize),
    Exhausted,
}

/// Sequential multi-backend orchestrator.
pub struct BackendOrchestrator {
    backends: Vec<Arc<dyn NarrativeBackend>>,
    gate: StructuralGate,
    composer: PromptComposer,
    config: RuntimeConfig,
}

impl BackendOrchestrator {
    /// Build from an ordered backend list; the caller is responsible for
    /// ending the list with the deterministic local composer.
    pub fn new(backends: Vec<Arc<dyn NarrativeBackend>>, config: RuntimeConfig) -> Self {
        let gate = StructuralGate::new(config.gate.clone());
        let composer = PromptComposer::new(config.prompt_budget_tokens);
        Self {
            backends,
            gate,
            composer,
            config,
        }
    }

    pub fn backends(&self) -> &[Arc<dyn NarrativeBackend>] {
        &self.backends
    }

    /// Run the attempt machine to a terminal state.
    pub async fn run(
        &self,
        ctx: DrawContext<'_>,
        cancel: &CancellationToken,
        telemetry: &mut ReadingTelemetry,
    ) -> Result<AcceptedDraft, OrchestratorError> {
        if self.backends.is_empty() {
            return Err(OrchestratorError::NoBackends);
        }

        let mut state = MachineState::Idle;
        tracing::debug!(state = ?state, backends = self.backends.len(), "orchestrator starting");

        for (index, backend) in self.backends.iter().enumerate() {
            state = MachineState::Attempting(index);
            tracing::debug!(state = ?state, backend = backend.id(), "entering attempt");

            let (contract, prompt_meta) = self.composer.compose(
                ctx.spread,
                ctx.drawn,
                ctx.patterns,
                ctx.question,
                ctx.references,
            );
            let request = GenerationRequest {
                contract: &contract,
                max_tokens: self.config.max_tokens,
                timeout: self.config.attempt_timeout,
            };

            let started = Instant::now();
            let generation = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                outcome = tokio::time::timeout(self.config.attempt_timeout, backend.generate(request)) => {
                    Some(outcome)
                }
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            let Some(outcome) = generation else {
                // A canceled attempt is logged as a transport failure but
                // the machine stops here; it does not advance.
                telemetry.record_attempt(AttemptRecord {
                    backend_id: backend.id().to_string(),
                    backend_kind: backend.kind(),
                    outcome: AttemptOutcome::TransportFailure {
                        error: "canceled by caller".to_string(),
                        canceled: true,
                    },
                    latency_ms,
                    prompt_meta,
                    gate_result: None,
                });
                tracing::warn!(backend = backend.id(), "attempt canceled");
                return Err(OrchestratorError::Canceled);
            };

            let response = match outcome {
                Err(_elapsed) => {
                    telemetry.record_attempt(AttemptRecord {
                        backend_id: backend.id().to_string(),
                        backend_kind: backend.kind(),
                        outcome: AttemptOutcome::TransportFailure {
                            error: format!("timeout after {:?}", self.config.attempt_timeout),
                            canceled: false,
                        },
                        latency_ms,
                        prompt_meta,
                        gate_result: None,
                    });
                    tracing::warn!(backend = backend.id(), "attempt timed out, trying next backend");
                    continue;
                }
                Ok(Err(error)) => {
                    telemetry.record_attempt(AttemptRecord {
                        backend_id: backend.id().to_string(),
                        backend_kind: backend.kind(),
                        outcome: AttemptOutcome::TransportFailure {
                            error: error.to_string(),
                            canceled: false,
                        },
                        latency_ms,
                        prompt_meta,
                        gate_result: None,
                    });
                    tracing::warn!(
                        backend = backend.id(),
                        error = %error,
                        "attempt transport failure, trying next backend"
                    );
                    continue;
                }
                Ok(Ok(response)) => response,
            };

            // Gate evaluation runs only on the fully assembled text.
            let gate_result = self
                .gate
                .evaluate(&response.text, ctx.drawn, ctx.spread, ctx.deck);

            if gate_result.passed {
                state = MachineState::Accepted(index);
                tracing::info!(
                    state = ?state,
                    backend = backend.id(),
                    latency_ms,
                    "narrative accepted by structural gate"
                );
                telemetry.record_attempt(AttemptRecord {
                    backend_id: backend.id().to_string(),
                    backend_kind: backend.kind(),
                    outcome: AttemptOutcome::Accepted,
                    latency_ms,
                    prompt_meta: prompt_meta.clone(),
                    gate_result: Some(gate_result.clone()),
                });
                telemetry.record_winner(backend.id(), prompt_meta.clone());

                return Ok(AcceptedDraft {
                    text: response.text,
                    backend_id: backend.id().to_string(),
                    model: response.model,
                    gate_result,
                    prompt_meta,
                    usage: response.usage,
                });
            }

            let issues = gate_result.issues.clone();
            tracing::warn!(
                backend = backend.id(),
                issues = ?issues,
                "narrative rejected by structural gate, trying next backend"
            );
            telemetry.record_attempt(AttemptRecord {
                backend_id: backend.id().to_string(),
                backend_kind: backend.kind(),
                outcome: AttemptOutcome::QualityRejection { issues },
                latency_ms,
                prompt_meta,
                gate_result: Some(gate_result),
            });
        }

        state = MachineState::Exhausted;

        // Even the deterministic composer failed the gate. This should be
        // vanishingly rare and is a system-level alert.
        tracing::error!(
            state = ?state,
            attempts = self.backends.len(),
            "all narrative backends exhausted; no narrative will be returned"
        );
        Err(OrchestratorError::Exhausted {
            attempts: self.backends.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BackendError, BackendKind, GenerationResponse, LocalComposer};
    use crate::config::EvaluationThresholds;
    use crate::telemetry::ThresholdsSnapshot;
    use arcana_core::catalog::CatalogRegistry;
    use arcana_core::{analyze, draw, GateCheck, GateConfig, RitualSeed};
    use async_trait::async_trait;
    use uuid::Uuid;

    struct Fixture {
        deck: Deck,
        spread: Spread,
        drawn: Vec<DrawnCard>,
        patterns: PatternSet,
    }

    fn fixture() -> Fixture {
        let registry = CatalogRegistry::builtin().unwrap();
        let deck = registry.deck("rws").unwrap().clone();
        let spread = registry.spread("three-card").unwrap().clone();
        let seed = RitualSeed::new(vec![5, 10, 15], 3, "what holds?", "rws");
        let drawn = draw::draw(&seed, &deck, &spread).unwrap();
        let patterns = analyze(&drawn);
        Fixture {
            deck,
            spread,
            drawn,
            patterns,
        }
    }

    fn telemetry() -> ReadingTelemetry {
        ReadingTelemetry::new(
            Uuid::new_v4(),
            "three-card",
            ThresholdsSnapshot {
                gate: GateConfig::default(),
                evaluation: EvaluationThresholds::default(),
            },
        )
    }

    /// Backend that always answers with headingless prose.
    struct HeadinglessBackend;

    #[async_trait]
    impl NarrativeBackend for HeadinglessBackend {
        fn id(&self) -> &str {
            "headingless"
        }
        fn kind(&self) -> BackendKind {
            BackendKind::Primary
        }
        async fn generate(
            &self,
            _request: GenerationRequest<'_>,
        ) -> Result<GenerationResponse, BackendError> {
            Ok(GenerationResponse {
                text: "A single stream of prose with no sections at all.".to_string(),
                usage: TokenUsage::default(),
                model: "mock".to_string(),
            })
        }
    }

    /// Backend that always fails at the transport layer.
    struct UnreachableBackend;

    #[async_trait]
    impl NarrativeBackend for UnreachableBackend {
        fn id(&self) -> &str {
            "unreachable"
        }
        fn kind(&self) -> BackendKind {
            BackendKind::Primary
        }
        async fn generate(
            &self,
            _request: GenerationRequest<'_>,
        ) -> Result<GenerationResponse, BackendError> {
            Err(BackendError::HttpError("connection refused".to_string()))
        }
    }

    fn orchestrator(backends: Vec<Arc<dyn NarrativeBackend>>) -> BackendOrchestrator {
        BackendOrchestrator::new(backends, RuntimeConfig::default())
    }

    fn ctx(f: &Fixture) -> DrawContext<'_> {
        DrawContext {
            deck: &f.deck,
            spread: &f.spread,
            drawn: &f.drawn,
            patterns: &f.patterns,
            question: "what holds?",
            references: &[],
        }
    }

    #[tokio::test]
    async fn quality_rejection_falls_back_and_keeps_the_reason() {
        let f = fixture();
        let orch = orchestrator(vec![
            Arc::new(HeadinglessBackend),
            Arc::new(LocalComposer::new()),
        ]);
        let cancel = CancellationToken::new();
        let mut tele = telemetry();

        let draft = orch.run(ctx(&f), &cancel, &mut tele).await.unwrap();
        assert_eq!(draft.backend_id, "local-composer");
        assert!(draft.gate_result.passed);

        // Backend A's specific rejection reason is retained alongside the
        // final accepted result.
        assert_eq!(tele.attempts.len(), 2);
        match &tele.attempts[0].outcome {
            AttemptOutcome::QualityRejection { issues } => {
                assert!(issues.iter().any(|i| i.check == GateCheck::Sections));
            }
            other => panic!("expected quality rejection, got {other:?}"),
        }
        assert_eq!(tele.accepted_backend_id.as_deref(), Some("local-composer"));
    }

    #[tokio::test]
    async fn transport_failure_falls_back() {
        let f = fixture();
        let orch = orchestrator(vec![
            Arc::new(UnreachableBackend),
            Arc::new(LocalComposer::new()),
        ]);
        let cancel = CancellationToken::new();
        let mut tele = telemetry();

        let draft = orch.run(ctx(&f), &cancel, &mut tele).await.unwrap();
        assert_eq!(draft.backend_id, "local-composer");
        assert!(matches!(
            tele.attempts[0].outcome,
            AttemptOutcome::TransportFailure { canceled: false, .. }
        ));
    }

    #[tokio::test]
    async fn exhaustion_is_fatal_and_returns_no_text() {
        let f = fixture();
        let orch = orchestrator(vec![
            Arc::new(HeadinglessBackend),
            Arc::new(UnreachableBackend),
        ]);
        let cancel = CancellationToken::new();
        let mut tele = telemetry();

        let err = orch.run(ctx(&f), &cancel, &mut tele).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Exhausted { attempts: 2 }));
        assert_eq!(tele.attempts.len(), 2);
        assert!(tele.accepted_backend_id.is_none());
    }

    #[tokio::test]
    async fn cancellation_stops_the_machine_without_advancing() {
        let f = fixture();
        let orch = orchestrator(vec![
            Arc::new(HeadinglessBackend),
            Arc::new(LocalComposer::new()),
        ]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut tele = telemetry();

        let err = orch.run(ctx(&f), &cancel, &mut tele).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Canceled));

        // Exactly one attempt recorded, as a canceled transport failure; the
        // machine did not move on to the local composer.
        assert_eq!(tele.attempts.len(), 1);
        assert!(matches!(
            tele.attempts[0].outcome,
            AttemptOutcome::TransportFailure { canceled: true, .. }
        ));
    }

    #[tokio::test]
    async fn accepted_metadata_comes_from_the_winning_attempt() {
        let f = fixture();
        let orch = orchestrator(vec![
            Arc::new(HeadinglessBackend),
            Arc::new(LocalComposer::new()),
        ]);
        let cancel = CancellationToken::new();
        let mut tele = telemetry();

        let draft = orch.run(ctx(&f), &cancel, &mut tele).await.unwrap();

        let winner = tele
            .attempts
            .iter()
            .find(|a| matches!(a.outcome, AttemptOutcome::Accepted))
            .unwrap();
        assert_eq!(winner.backend_id, draft.backend_id);
        assert_eq!(winner.prompt_meta, draft.prompt_meta);
        assert_eq!(
            tele.winning_prompt_meta.as_ref(),
            Some(&draft.prompt_meta)
        );
        // The rejected attempt's gate result is not the one on the draft.
        assert!(!tele.attempts[0].gate_result.as_ref().unwrap().passed);
        assert!(draft.gate_result.passed);
    }

    #[tokio::test]
    async fn empty_backend_list_is_an_error() {
        let f = fixture();
        let orch = orchestrator(vec![]);
        let cancel = CancellationToken::new();
        let mut tele = telemetry();

        let err = orch.run(ctx(&f), &cancel, &mut tele).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NoBackends));
    }
}
