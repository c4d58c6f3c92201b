//! Runtime configuration.
//!
//! One struct holds every tunable of the generation pipeline, including the
//! single canonical copy of the gate and rubric thresholds. Components take
//! their thresholds from here; nothing duplicates a numeric threshold in
//! prompt text or check code.

use std::time::Duration;

use arcana_core::GateConfig;
use serde::{Deserialize, Serialize};

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Rubric floors for the evaluation gate, on a 0-5 scale.
///
/// These were tuned empirically and are provisional; they are configuration
/// and their exact values are not load-bearing for correctness.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EvaluationThresholds {
    pub coherence_min: f64,
    pub relevance_min: f64,
    pub safety_min: f64,
}

impl Default for EvaluationThresholds {
    fn default() -> Self {
        Self {
            coherence_min: 3.5,
            relevance_min: 3.5,
            safety_min: 4.0,
        }
    }
}

/// Evaluation-gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Run the model-assisted second stage at all.
    pub enabled: bool,

    pub thresholds: EvaluationThresholds,

    /// Timeout for one scoring call.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,

    /// Maximum cached score entries.
    pub cache_entries: u64,

    /// Cached score time-to-live.
    #[serde(with = "duration_secs")]
    pub cache_ttl: Duration,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            thresholds: EvaluationThresholds::default(),
            timeout: Duration::from_secs(20),
            cache_entries: 2_000,
            cache_ttl: Duration::from_secs(3600),
        }
    }
}

/// Retry policy for transient HTTP failures within a single attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first try (0 disables retrying).
    pub max_retries: usize,

    /// Initial backoff delay.
    #[serde(with = "duration_secs")]
    pub min_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            min_delay: Duration::from_secs(1),
        }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Timeout for one backend generation attempt.
    #[serde(with = "duration_secs")]
    pub attempt_timeout: Duration,

    /// Token ceiling for generated narratives.
    pub max_tokens: u32,

    /// Prompt-contract token budget; the composer slims reference passages
    /// to stay under it.
    pub prompt_budget_tokens: u32,

    pub retry: RetryConfig,

    /// Structural gate thresholds.
    pub gate: GateConfig,

    /// Evaluation gate settings.
    pub evaluation: EvaluationConfig,

    /// Readings allowed per user per calendar month.
    pub monthly_reading_limit: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(45),
            max_tokens: 1_500,
            prompt_budget_tokens: 3_000,
            retry: RetryConfig::default(),
            gate: GateConfig::default(),
            evaluation: EvaluationConfig::default(),
            monthly_reading_limit: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = RuntimeConfig::default();
        assert!(config.attempt_timeout >= Duration::from_secs(10));
        assert!(config.evaluation.thresholds.safety_min >= config.evaluation.thresholds.coherence_min);
        assert!(config.monthly_reading_limit > 0);
    }

    #[test]
    fn durations_round_trip_as_seconds() {
        let config = RuntimeConfig::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["attempt_timeout"], 45);

        let back: RuntimeConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.attempt_timeout, Duration::from_secs(45));
    }

    #[test]
    fn gate_thresholds_deserialize_with_defaults() {
        let json = serde_json::json!({
            "attempt_timeout": 30,
            "max_tokens": 1000,
            "prompt_budget_tokens": 2000,
            "retry": { "max_retries": 1, "min_delay": 1 },
            "gate": {},
            "evaluation": {
                "enabled": false,
                "thresholds": { "coherence_min": 3.0, "relevance_min": 3.0, "safety_min": 4.5 },
                "timeout": 10,
                "cache_entries": 10,
                "cache_ttl": 60
            },
            "monthly_reading_limit": 5
        });
        let config: RuntimeConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.gate.min_sections, 2);
        assert!(!config.evaluation.enabled);
    }
}
