//! Structural quality gate.
//!
//! Deterministic, rule-based acceptance check run on every backend attempt,
//! immediately after generation and always on the fully assembled text.
//! The gate is a pure function of `(text, drawn cards, spread, deck,
//! config)`: evaluating the same inputs twice yields the identical result.

use serde::{Deserialize, Serialize};

use crate::types::{Deck, DrawnCard, GateCheck, GateIssue, GateMetrics, GateResult, Severity, Spread};

pub mod coverage;
pub mod hallucination;
pub mod sections;
pub mod spine;

pub use sections::{Classification, Section, SectionKind};
pub use spine::SignalOutcome;

fn default_min_sections() -> usize {
    2
}
fn default_header_max_chars() -> usize {
    80
}
fn default_attention_weight_threshold() -> f64 {
    0.7
}
fn default_spine_ratio_threshold() -> f64 {
    0.6
}
fn default_allowlist() -> Vec<String> {
    hallucination::DEFAULT_ALLOWLIST
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Tunable gate thresholds.
///
/// The spine ratio and attention-weight thresholds were tuned empirically
/// and are provisional; they are configuration, and their exact values are
/// not load-bearing for correctness.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateConfig {
    /// Minimum detected sections before anything else is considered.
    #[serde(default = "default_min_sections")]
    pub min_sections: usize,

    /// Header lines longer than this are treated as prose, not headers.
    #[serde(default = "default_header_max_chars")]
    pub header_max_chars: usize,

    /// Positions above this attention weight must be referenced.
    #[serde(default = "default_attention_weight_threshold")]
    pub attention_weight_threshold: f64,

    /// Required fraction of card sections with a complete spine.
    #[serde(default = "default_spine_ratio_threshold")]
    pub spine_ratio_threshold: f64,

    /// Card titles excluded from hallucination detection as generic
    /// vocabulary.
    #[serde(default = "default_allowlist")]
    pub hallucination_allowlist: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_sections: default_min_sections(),
            header_max_chars: default_header_max_chars(),
            attention_weight_threshold: default_attention_weight_threshold(),
            spine_ratio_threshold: default_spine_ratio_threshold(),
            hallucination_allowlist: default_allowlist(),
        }
    }
}

/// The deterministic structural validator.
#[derive(Debug, Clone, Default)]
pub struct StructuralGate {
    config: GateConfig,
}

impl StructuralGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Evaluate a candidate narrative against the draw it claims to read.
    pub fn evaluate(
        &self,
        text: &str,
        drawn: &[DrawnCard],
        spread: &Spread,
        deck: &Deck,
    ) -> GateResult {
        let mut issues = Vec::new();

        // 1+2. Section split and classification.
        let sections = sections::detect_sections(text, drawn, spread, self.config.header_max_chars);
        if sections.len() < self.config.min_sections {
            issues.push(GateIssue {
                check: GateCheck::Sections,
                severity: Severity::Error,
                detail: format!(
                    "no narrative sections detected ({} found, {} required)",
                    sections.len(),
                    self.config.min_sections
                ),
            });
        }

        // 3. Coverage of drawn cards and high-weight positions.
        let coverage =
            coverage::assess_coverage(text, drawn, self.config.attention_weight_threshold);
        for name in &coverage.missing {
            issues.push(GateIssue {
                check: GateCheck::Coverage,
                severity: Severity::Error,
                detail: format!("drawn card never mentioned: {name}"),
            });
        }
        for (label, name) in &coverage.missing_high_weight {
            issues.push(GateIssue {
                check: GateCheck::HighWeightPosition,
                severity: Severity::Error,
                detail: format!("missing high-weight position: {label} ({name})"),
            });
        }

        // 4. Hallucination scan over the full catalog.
        let hallucinated = hallucination::find_hallucinations(
            text,
            deck,
            drawn,
            &self.config.hallucination_allowlist,
        );
        for name in &hallucinated {
            issues.push(GateIssue {
                check: GateCheck::Hallucination,
                severity: Severity::Error,
                detail: format!("undrawn card mentioned: {name}"),
            });
        }

        // 5. Spine completeness over card-classified sections.
        let card_sections: Vec<&sections::Section> = sections
            .iter()
            .filter(|s| s.kind == SectionKind::Card)
            .collect();
        let spine_ratio = if card_sections.is_empty() {
            issues.push(GateIssue {
                check: GateCheck::Spine,
                severity: Severity::Warning,
                detail: "no card sections classified; spine check vacuous".to_string(),
            });
            1.0
        } else {
            let complete = card_sections
                .iter()
                .filter(|s| spine::section_complete(&s.body, &s.header, drawn))
                .count();
            complete as f64 / card_sections.len() as f64
        };
        if spine_ratio < self.config.spine_ratio_threshold {
            issues.push(GateIssue {
                check: GateCheck::Spine,
                severity: Severity::Error,
                detail: format!(
                    "spine completion {spine_ratio:.2} below threshold {:.2}",
                    self.config.spine_ratio_threshold
                ),
            });
        }

        let passed = !issues.iter().any(|i| i.severity == Severity::Error);

        GateResult {
            passed,
            issues,
            metrics: GateMetrics {
                coverage_ratio: coverage.ratio,
                hallucination_count: hallucinated.len(),
                spine_completion_ratio: spine_ratio,
            },
        }
    }
}
