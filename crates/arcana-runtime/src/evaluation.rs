//! Evaluation gate: model-assisted rubric scoring behind a deterministic
//! safety backstop.
//!
//! This second stage runs once, only on structurally-accepted text. The
//! safety patterns from `arcana-core` are checked first and force a block
//! regardless of any model score; the rubric scorer then compares its
//! per-dimension scores against the single canonical threshold set from
//! [`crate::config::EvaluationConfig`]. A block is terminal: a reading is
//! quarantined, never retried against another backend, because tone and
//! safety failures are not fixed by switching backends.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};

use arcana_core::safety::{self, SafetyCategory};

use crate::backends::BackendError;
use crate::config::EvaluationConfig;

/// One rubric dimension the scorer must rate on a 0-5 scale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RubricDimension {
    pub key: String,
    pub description: String,
}

/// The scoring rubric sent to the evaluation backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rubric {
    pub dimensions: Vec<RubricDimension>,
}

impl Default for Rubric {
    fn default() -> Self {
        Self {
            dimensions: vec![
                RubricDimension {
                    key: "coherence".into(),
                    description: "The narrative hangs together; sections follow from one another."
                        .into(),
                },
                RubricDimension {
                    key: "relevance".into(),
                    description: "The narrative answers the querent's question through the drawn cards."
                        .into(),
                },
                RubricDimension {
                    key: "safety".into(),
                    description: "Tone is supportive, non-coercive, and issues no directives."
                        .into(),
                },
            ],
        }
    }
}

/// Per-dimension scores from the evaluation backend, 0-5.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DimensionScores {
    pub coherence: f64,
    pub relevance: f64,
    pub safety: f64,
}

/// A model-assisted scorer.
#[async_trait]
pub trait EvaluationBackend: Send + Sync {
    fn id(&self) -> &str;

    async fn score(&self, text: &str, rubric: &Rubric) -> Result<DimensionScores, BackendError>;
}

/// Terminal decision of the evaluation gate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationDecision {
    Accept,
    Block,
}

/// Full evaluation-gate outcome, persisted with the reading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationOutcome {
    pub decision: EvaluationDecision,

    /// Human-readable block reason; absent on accept.
    pub reason: Option<String>,

    /// Safety category when the deterministic backstop forced the block.
    pub blocked_category: Option<SafetyCategory>,

    /// Rubric scores, when the scorer ran.
    pub scores: Option<DimensionScores>,

    /// True when the scorer was unavailable and only the deterministic
    /// backstop ran.
    pub scorer_degraded: bool,
}

impl EvaluationOutcome {
    pub fn is_blocked(&self) -> bool {
        self.decision == EvaluationDecision::Block
    }
}

/// System prompt for model-assisted rubric scoring.
pub const SCORING_PROMPT: &str = r#"
You are scoring a tarot reading against a fixed rubric. You do not rewrite
or judge style. Rate each dimension from 0.0 to 5.0.

Respond with JSON only:
{"coherence": 0.0, "relevance": 0.0, "safety": 0.0}
"#;

/// Parse scorer output, tolerating fenced or prefixed JSON.
pub(crate) fn parse_scores(raw: &str) -> Result<DimensionScores, BackendError> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let (Some(start), Some(end)) = (start, end) else {
        return Err(BackendError::ParseError(
            "no JSON object in scorer output".to_string(),
        ));
    };
    if end < start {
        return Err(BackendError::ParseError(
            "malformed JSON object in scorer output".to_string(),
        ));
    }

    serde_json::from_str(&raw[start..=end]).map_err(|e| BackendError::ParseError(e.to_string()))
}

fn text_key(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

/// The optional second-stage gate.
pub struct EvaluationGate {
    scorer: Option<Arc<dyn EvaluationBackend>>,
    rubric: Rubric,
    config: EvaluationConfig,
    cache: Cache<u64, DimensionScores>,
}

impl EvaluationGate {
    pub fn new(scorer: Option<Arc<dyn EvaluationBackend>>, config: EvaluationConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.cache_entries)
            .time_to_live(config.cache_ttl)
            .build();
        Self {
            scorer,
            rubric: Rubric::default(),
            config,
            cache,
        }
    }

    /// Evaluate accepted text. Never retried; the outcome is terminal.
    pub async fn evaluate(&self, text: &str) -> EvaluationOutcome {
        // Deterministic backstop first. A hit blocks no matter what any
        // model score would say.
        let hits = safety::scan(text);
        if let Some(hit) = hits.first() {
            tracing::warn!(
                category = %hit.category,
                matched = %hit.matched,
                "safety backstop blocked reading"
            );
            return EvaluationOutcome {
                decision: EvaluationDecision::Block,
                reason: Some(format!(
                    "safety pattern matched ({}): \"{}\"",
                    hit.category, hit.matched
                )),
                blocked_category: Some(hit.category),
                scores: None,
                scorer_degraded: false,
            };
        }

        if !self.config.enabled {
            return EvaluationOutcome {
                decision: EvaluationDecision::Accept,
                reason: None,
                blocked_category: None,
                scores: None,
                scorer_degraded: false,
            };
        }

        let Some(scorer) = &self.scorer else {
            return EvaluationOutcome {
                decision: EvaluationDecision::Accept,
                reason: None,
                blocked_category: None,
                scores: None,
                scorer_degraded: false,
            };
        };

        let key = text_key(text);
        let scores = if let Some(cached) = self.cache.get(&key).await {
            Some(cached)
        } else {
            match tokio::time::timeout(self.config.timeout, scorer.score(text, &self.rubric)).await
            {
                Ok(Ok(scores)) => {
                    self.cache.insert(key, scores).await;
                    Some(scores)
                }
                Ok(Err(error)) => {
                    tracing::warn!(scorer = scorer.id(), error = %error, "rubric scorer failed");
                    None
                }
                Err(_) => {
                    tracing::warn!(scorer = scorer.id(), "rubric scorer timed out");
                    None
                }
            }
        };

        let Some(scores) = scores else {
            // Scorer outage: the deterministic backstop already passed, so
            // accept with the degradation recorded.
            return EvaluationOutcome {
                decision: EvaluationDecision::Accept,
                reason: None,
                blocked_category: None,
                scores: None,
                scorer_degraded: true,
            };
        };

        let thresholds = &self.config.thresholds;
        let mut failing = Vec::new();
        if scores.coherence < thresholds.coherence_min {
            failing.push(format!(
                "coherence {:.1} < {:.1}",
                scores.coherence, thresholds.coherence_min
            ));
        }
        if scores.relevance < thresholds.relevance_min {
            failing.push(format!(
                "relevance {:.1} < {:.1}",
                scores.relevance, thresholds.relevance_min
            ));
        }
        if scores.safety < thresholds.safety_min {
            failing.push(format!(
                "safety {:.1} < {:.1}",
                scores.safety, thresholds.safety_min
            ));
        }

        if failing.is_empty() {
            EvaluationOutcome {
                decision: EvaluationDecision::Accept,
                reason: None,
                blocked_category: None,
                scores: Some(scores),
                scorer_degraded: false,
            }
        } else {
            tracing::warn!(failing = ?failing, "rubric scores below thresholds");
            EvaluationOutcome {
                decision: EvaluationDecision::Block,
                reason: Some(format!("rubric floors not met: {}", failing.join(", "))),
                blocked_category: None,
                scores: Some(scores),
                scorer_degraded: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scorer that always returns the same scores and counts its calls.
    struct ScriptedScorer {
        scores: DimensionScores,
        calls: AtomicUsize,
    }

    impl ScriptedScorer {
        fn new(coherence: f64, relevance: f64, safety: f64) -> Arc<Self> {
            Arc::new(Self {
                scores: DimensionScores {
                    coherence,
                    relevance,
                    safety,
                },
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl EvaluationBackend for ScriptedScorer {
        fn id(&self) -> &str {
            "scripted"
        }
        async fn score(&self, _text: &str, _rubric: &Rubric) -> Result<DimensionScores, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.scores)
        }
    }

    struct FailingScorer;

    #[async_trait]
    impl EvaluationBackend for FailingScorer {
        fn id(&self) -> &str {
            "failing"
        }
        async fn score(&self, _text: &str, _rubric: &Rubric) -> Result<DimensionScores, BackendError> {
            Err(BackendError::HttpError("scorer offline".to_string()))
        }
    }

    fn gate_with(scorer: Option<Arc<dyn EvaluationBackend>>) -> EvaluationGate {
        EvaluationGate::new(scorer, EvaluationConfig::default())
    }

    #[tokio::test]
    async fn clean_text_with_good_scores_is_accepted() {
        let gate = gate_with(Some(ScriptedScorer::new(4.5, 4.2, 5.0)));
        let outcome = gate.evaluate("A gentle reading about patience.").await;
        assert_eq!(outcome.decision, EvaluationDecision::Accept);
        assert!(outcome.scores.is_some());
        assert!(!outcome.scorer_degraded);
    }

    #[tokio::test]
    async fn safety_backstop_overrides_a_permissive_model_score() {
        // The scorer rates everything as perfectly safe; the deterministic
        // pattern must still block.
        let scorer = ScriptedScorer::new(5.0, 5.0, 5.0);
        let gate = gate_with(Some(scorer.clone()));

        let outcome = gate
            .evaluate("The cards say your life is not worth living.")
            .await;

        assert!(outcome.is_blocked());
        assert_eq!(outcome.blocked_category, Some(SafetyCategory::SelfHarm));
        // The scorer never even ran.
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn low_rubric_score_blocks_with_the_failing_dimension() {
        let gate = gate_with(Some(ScriptedScorer::new(1.0, 4.5, 5.0)));
        let outcome = gate.evaluate("Rambling text that scored poorly.").await;

        assert!(outcome.is_blocked());
        let reason = outcome.reason.unwrap();
        assert!(reason.contains("coherence"));
        assert_eq!(outcome.blocked_category, None);
    }

    #[tokio::test]
    async fn scorer_outage_degrades_to_backstop_only_acceptance() {
        let gate = gate_with(Some(Arc::new(FailingScorer)));
        let outcome = gate.evaluate("A clean reading, scored by nobody.").await;

        assert_eq!(outcome.decision, EvaluationDecision::Accept);
        assert!(outcome.scorer_degraded);
        assert!(outcome.scores.is_none());
    }

    #[tokio::test]
    async fn disabled_gate_accepts_without_scoring() {
        let scorer = ScriptedScorer::new(0.0, 0.0, 0.0);
        let gate = EvaluationGate::new(
            Some(scorer.clone()),
            EvaluationConfig {
                enabled: false,
                ..EvaluationConfig::default()
            },
        );

        let outcome = gate.evaluate("Any text at all.").await;
        assert_eq!(outcome.decision, EvaluationDecision::Accept);
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn scores_are_cached_per_text() {
        let scorer = ScriptedScorer::new(4.0, 4.0, 5.0);
        let gate = gate_with(Some(scorer.clone()));

        let text = "The same reading, twice.";
        let first = gate.evaluate(text).await;
        let second = gate.evaluate(text).await;

        assert_eq!(first, second);
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_counts_as_degraded() {
        struct SlowScorer;

        #[async_trait]
        impl EvaluationBackend for SlowScorer {
            fn id(&self) -> &str {
                "slow"
            }
            async fn score(
                &self,
                _text: &str,
                _rubric: &Rubric,
            ) -> Result<DimensionScores, BackendError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                unreachable!("the gate times out first")
            }
        }

        let gate = EvaluationGate::new(
            Some(Arc::new(SlowScorer)),
            EvaluationConfig {
                timeout: Duration::from_millis(20),
                ..EvaluationConfig::default()
            },
        );
        let outcome = gate.evaluate("Slowly scored text.").await;
        assert!(outcome.scorer_degraded);
        assert_eq!(outcome.decision, EvaluationDecision::Accept);
    }

    #[test]
    fn parse_scores_tolerates_fencing() {
        let raw = "```json\n{\"coherence\": 4.0, \"relevance\": 3.5, \"safety\": 5.0}\n```";
        let scores = parse_scores(raw).unwrap();
        assert_eq!(scores.coherence, 4.0);
        assert_eq!(scores.safety, 5.0);
    }

    #[test]
    fn parse_scores_rejects_prose() {
        assert!(parse_scores("I would rate this highly.").is_err());
    }
}
