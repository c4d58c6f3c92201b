//! Per-reading telemetry.
//!
//! Every attempt is recorded — backend, outcome, latency, gate result, and
//! prompt metadata — together with a snapshot of the thresholds in force.
//! Only the winning attempt's prompt metadata is ever persisted onto the
//! reading itself; rejected attempts live here and nowhere else.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use arcana_core::{GateConfig, GateIssue, GateResult};

use crate::backends::BackendKind;
use crate::config::EvaluationThresholds;
use crate::prompt::PromptMeta;

/// Errors from telemetry sinks. Sinks fail open: a recording failure is
/// logged and never blocks a reading.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("telemetry sink failed: {0}")]
    Sink(String),
}

/// How one attempt ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Accepted,
    TransportFailure { error: String, canceled: bool },
    QualityRejection { issues: Vec<GateIssue> },
}

/// One backend attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub backend_id: String,
    pub backend_kind: BackendKind,
    pub outcome: AttemptOutcome,
    pub latency_ms: u64,
    pub prompt_meta: PromptMeta,
    pub gate_result: Option<GateResult>,
}

/// The thresholds in force when a reading was generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdsSnapshot {
    pub gate: GateConfig,
    pub evaluation: EvaluationThresholds,
}

/// Everything observed while generating one reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingTelemetry {
    pub reading_id: Uuid,
    pub spread_key: String,
    pub attempts: Vec<AttemptRecord>,
    pub thresholds: ThresholdsSnapshot,
    pub accepted_backend_id: Option<String>,
    pub winning_prompt_meta: Option<PromptMeta>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ReadingTelemetry {
    pub fn new(reading_id: Uuid, spread_key: impl Into<String>, thresholds: ThresholdsSnapshot) -> Self {
        Self {
            reading_id,
            spread_key: spread_key.into(),
            attempts: Vec::new(),
            thresholds,
            accepted_backend_id: None,
            winning_prompt_meta: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn record_attempt(&mut self, attempt: AttemptRecord) {
        self.attempts.push(attempt);
    }

    /// Mark the winning attempt. Its prompt metadata is the only one that
    /// accompanies the reading.
    pub fn record_winner(&mut self, backend_id: impl Into<String>, prompt_meta: PromptMeta) {
        self.accepted_backend_id = Some(backend_id.into());
        self.winning_prompt_meta = Some(prompt_meta);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Rejection reasons per backend, for observability.
    pub fn rejections(&self) -> Vec<(&str, &AttemptOutcome)> {
        self.attempts
            .iter()
            .filter(|a| !matches!(a.outcome, AttemptOutcome::Accepted))
            .map(|a| (a.backend_id.as_str(), &a.outcome))
            .collect()
    }
}

/// Destination for finished telemetry.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, telemetry: &ReadingTelemetry) -> Result<(), TelemetryError>;
}

/// Sink that emits structured log events.
#[derive(Debug, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record(&self, telemetry: &ReadingTelemetry) -> Result<(), TelemetryError> {
        tracing::info!(
            reading_id = %telemetry.reading_id,
            spread = %telemetry.spread_key,
            attempts = telemetry.attempts.len(),
            accepted_backend = telemetry.accepted_backend_id.as_deref().unwrap_or("none"),
            "reading telemetry"
        );
        for attempt in &telemetry.attempts {
            match &attempt.outcome {
                AttemptOutcome::Accepted => {
                    tracing::info!(
                        backend = %attempt.backend_id,
                        latency_ms = attempt.latency_ms,
                        slimmed = attempt.prompt_meta.slimmed,
                        "attempt accepted"
                    );
                }
                AttemptOutcome::TransportFailure { error, canceled } => {
                    tracing::warn!(
                        backend = %attempt.backend_id,
                        error = %error,
                        canceled,
                        "attempt transport failure"
                    );
                }
                AttemptOutcome::QualityRejection { issues } => {
                    tracing::warn!(
                        backend = %attempt.backend_id,
                        issues = ?issues,
                        "attempt rejected by structural gate"
                    );
                }
            }
        }
        Ok(())
    }
}

/// In-memory sink for tests and local inspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<ReadingTelemetry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ReadingTelemetry> {
        self.records.lock().clone()
    }
}

impl TelemetrySink for MemorySink {
    fn record(&self, telemetry: &ReadingTelemetry) -> Result<(), TelemetryError> {
        self.records.lock().push(telemetry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptMeta;

    fn meta() -> PromptMeta {
        PromptMeta {
            version: "reading-contract/3".into(),
            estimated_tokens: 500,
            slimmed: false,
            dropped_references: 0,
        }
    }

    fn snapshot() -> ThresholdsSnapshot {
        ThresholdsSnapshot {
            gate: GateConfig::default(),
            evaluation: EvaluationThresholds::default(),
        }
    }

    #[test]
    fn rejections_exclude_the_accepted_attempt() {
        let mut telemetry = ReadingTelemetry::new(Uuid::new_v4(), "three-card", snapshot());
        telemetry.record_attempt(AttemptRecord {
            backend_id: "anthropic".into(),
            backend_kind: BackendKind::Primary,
            outcome: AttemptOutcome::QualityRejection { issues: vec![] },
            latency_ms: 900,
            prompt_meta: meta(),
            gate_result: None,
        });
        telemetry.record_attempt(AttemptRecord {
            backend_id: "local-composer".into(),
            backend_kind: BackendKind::LocalComposer,
            outcome: AttemptOutcome::Accepted,
            latency_ms: 3,
            prompt_meta: meta(),
            gate_result: None,
        });

        let rejections = telemetry.rejections();
        assert_eq!(rejections.len(), 1);
        assert_eq!(rejections[0].0, "anthropic");
    }

    #[test]
    fn memory_sink_stores_records() {
        let sink = MemorySink::new();
        let mut telemetry = ReadingTelemetry::new(Uuid::new_v4(), "single", snapshot());
        telemetry.finish();

        sink.record(&telemetry).unwrap();
        assert_eq!(sink.records().len(), 1);
        assert!(sink.records()[0].finished_at.is_some());
    }

    #[test]
    fn telemetry_serializes_for_export() {
        let mut telemetry = ReadingTelemetry::new(Uuid::new_v4(), "single", snapshot());
        telemetry.record_winner("local-composer", meta());

        let json = serde_json::to_value(&telemetry).unwrap();
        assert_eq!(json["accepted_backend_id"], "local-composer");
        assert_eq!(json["thresholds"]["gate"]["min_sections"], 2);
    }
}
