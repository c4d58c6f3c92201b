//! Prompt composition.
//!
//! The composer builds one backend-agnostic [`PromptContract`] per attempt:
//! spread and position descriptions, every drawn card with its orientation
//! and meaning, pattern hints, and optional retrieved reference passages.
//! Backends reformat the contract but must preserve every card fact.
//!
//! The system prompt is layered for cache efficiency: the base prompt is
//! constant across all requests; only the contract body varies.

use arcana_core::patterns::{DyadKind, PatternSet, TriadKind};
use arcana_core::{DrawnCard, Spread};
use serde::{Deserialize, Serialize};

/// Version tag persisted with every reading that used this contract shape.
pub const PROMPT_VERSION: &str = "reading-contract/3";

/// Base system prompt shared across narrative backends.
///
/// The structural requirements here mirror what the structural gate checks;
/// the gate, not this text, is the enforcement point.
pub const BASE_READER_PROMPT: &str = r#"
You are a tarot reader composing one complete reading.

Requirements for the response:
1. Use markdown sections: one opening section, one section per spread
   position, one guidance section, one closing section.
2. Head each position section with the position label and the card name.
3. Mention every drawn card by its exact name at least once.
4. Never mention a card that was not drawn.
5. In each card section: say what the card means here, and ground it in
   why it applies or what it suggests comes next.
6. Do not issue medical, legal, or financial directives. Never use
   coercive or fatalistic framing.

Write warm, concrete prose. The querent's question is the thread; keep
every section tied to it.
"#;

/// One drawn card, flattened for backends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CardBrief {
    pub name: String,
    pub orientation: String,
    pub position_label: String,
    pub role_key: String,
    pub attention_weight: f64,
    pub meaning: String,
}

/// One spread position, flattened for backends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionBrief {
    pub label: String,
    pub role_key: String,
    pub attention_weight: f64,
}

/// A retrieved reference passage with a keep-priority.
///
/// Higher priority survives slimming longer; the composer drops the lowest
/// priority first and never drops card data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferencePassage {
    pub title: String,
    pub body: String,
    pub priority: u8,
}

/// The backend-agnostic prompt contract for one attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptContract {
    pub version: String,
    pub spread_key: String,
    pub spread_name: String,
    pub question: String,
    pub positions: Vec<PositionBrief>,
    pub cards: Vec<CardBrief>,
    pub pattern_hints: Vec<String>,
    pub references: Vec<ReferencePassage>,
}

/// Metadata recorded in telemetry and persisted with the winning attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptMeta {
    pub version: String,
    pub estimated_tokens: u32,
    pub slimmed: bool,
    pub dropped_references: usize,
}

/// Render human-readable pattern hints.
pub fn pattern_hints(patterns: &PatternSet) -> Vec<String> {
    let mut hints = Vec::new();

    for dyad in &patterns.dyads {
        let hint = match dyad.kind {
            DyadKind::SharedRank => format!(
                "{} and {} share a rank; a theme repeats across suits.",
                dyad.cards[0], dyad.cards[1]
            ),
            DyadKind::OpposedSuits => format!(
                "{} and {} sit in opposed elements; a tension asks for balance.",
                dyad.cards[0], dyad.cards[1]
            ),
            DyadKind::MirroredMajors => format!(
                "{} and {} mirror each other across the trump sequence.",
                dyad.cards[0], dyad.cards[1]
            ),
        };
        hints.push(hint);
    }

    for triad in &patterns.triads {
        let hint = match triad.kind {
            TriadKind::MajorConfluence => format!(
                "Three majors gather: {}, {}, {}. Large forces are in play.",
                triad.cards[0], triad.cards[1], triad.cards[2]
            ),
            TriadKind::SuitRun => format!(
                "A run of one suit: {}, {}, {}.",
                triad.cards[0], triad.cards[1], triad.cards[2]
            ),
        };
        hints.push(hint);
    }

    for progression in &patterns.suit_progressions {
        let direction = if progression.ascending {
            "builds"
        } else {
            "winds down"
        };
        hints.push(format!(
            "The {} story {} through {}.",
            progression.suit,
            direction,
            progression.cards.join(", ")
        ));
    }

    if let Some(stage) = patterns.journey_stage {
        hints.push(format!(
            "The trumps sit in the {:?} span of the journey.",
            stage
        ));
    }

    hints
}

/// Render the contract body as the user-turn prompt.
pub fn render_user_prompt(contract: &PromptContract) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "## Question\n{}\n\n## Spread: {} ({})\n",
        contract.question, contract.spread_name, contract.spread_key
    ));
    for position in &contract.positions {
        out.push_str(&format!(
            "- {} (role: {}, weight {:.1})\n",
            position.label, position.role_key, position.attention_weight
        ));
    }

    out.push_str("\n## Drawn Cards\n");
    for card in &contract.cards {
        out.push_str(&format!(
            "- {}: {} ({}) meaning here: {}\n",
            card.position_label, card.name, card.orientation, card.meaning
        ));
    }

    if !contract.pattern_hints.is_empty() {
        out.push_str("\n## Patterns\n");
        for hint in &contract.pattern_hints {
            out.push_str(&format!("- {hint}\n"));
        }
    }

    if !contract.references.is_empty() {
        out.push_str("\n## Reference Passages\n");
        for reference in &contract.references {
            out.push_str(&format!("### {}\n{}\n", reference.title, reference.body));
        }
    }

    out
}

/// ~4 chars per token, the same rough estimate the backends use.
fn estimate_tokens(text: &str) -> u32 {
    (text.len() / 4) as u32
}

/// Assembles prompt contracts under a token budget.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    budget_tokens: u32,
}

impl PromptComposer {
    pub fn new(budget_tokens: u32) -> Self {
        Self { budget_tokens }
    }

    /// Build the contract for one attempt.
    ///
    /// When over budget, reference passages are dropped lowest-priority
    /// first until the estimate fits; card data is never dropped.
    pub fn compose(
        &self,
        spread: &Spread,
        drawn: &[DrawnCard],
        patterns: &PatternSet,
        question: &str,
        references: &[ReferencePassage],
    ) -> (PromptContract, PromptMeta) {
        let mut contract = PromptContract {
            version: PROMPT_VERSION.to_string(),
            spread_key: spread.key.clone(),
            spread_name: spread.name.clone(),
            question: question.to_string(),
            positions: spread
                .positions
                .iter()
                .map(|p| PositionBrief {
                    label: p.label.clone(),
                    role_key: p.role_key.clone(),
                    attention_weight: p.attention_weight,
                })
                .collect(),
            cards: drawn
                .iter()
                .map(|dc| CardBrief {
                    name: dc.card.name.clone(),
                    orientation: dc.orientation.to_string(),
                    position_label: dc.position.label.clone(),
                    role_key: dc.position.role_key.clone(),
                    attention_weight: dc.position.attention_weight,
                    meaning: dc.meaning().to_string(),
                })
                .collect(),
            pattern_hints: pattern_hints(patterns),
            references: references.to_vec(),
        };

        let mut dropped = 0usize;
        let mut estimated = self.estimate(&contract);
        while estimated > self.budget_tokens && !contract.references.is_empty() {
            // Drop the lowest priority; among ties, the latest passage goes.
            let victim = contract
                .references
                .iter()
                .enumerate()
                .rev()
                .min_by_key(|(_, r)| r.priority)
                .map(|(i, _)| i);
            if let Some(i) = victim {
                contract.references.remove(i);
                dropped += 1;
            }
            estimated = self.estimate(&contract);
        }

        if dropped > 0 {
            tracing::debug!(
                dropped,
                estimated_tokens = estimated,
                budget = self.budget_tokens,
                "prompt slimmed to fit token budget"
            );
        }

        let meta = PromptMeta {
            version: PROMPT_VERSION.to_string(),
            estimated_tokens: estimated,
            slimmed: dropped > 0,
            dropped_references: dropped,
        };

        (contract, meta)
    }

    fn estimate(&self, contract: &PromptContract) -> u32 {
        estimate_tokens(BASE_READER_PROMPT) + estimate_tokens(&render_user_prompt(contract))
    }
}
