//! Deterministic local template composer.
//!
//! The final backend in the ordered list. It builds a sectioned reading
//! directly from the prompt contract with no model call, and is written to
//! satisfy the structural contract mechanically: one header per position,
//! every card named, spine language in every card section, and no card
//! mentioned that was not drawn. The querent's question is referenced but
//! never quoted, so user text cannot smuggle card names into the output.

use async_trait::async_trait;

use super::{
    BackendError, BackendKind, GenerationRequest, GenerationResponse, NarrativeBackend, TokenUsage,
};
use crate::prompt::{CardBrief, PromptContract};

/// Rotating connective phrasings keyed by card index; deterministic.
const BECAUSE_PHRASES: &[&str] = &[
    "It sits here because",
    "It belongs in this place because",
    "It surfaces now because",
];

const AHEAD_PHRASES: &[&str] = &[
    "In the days ahead, expect",
    "Watch for",
    "Soon you can expect",
];

/// The deterministic fallback backend.
#[derive(Debug, Clone, Default)]
pub struct LocalComposer;

impl LocalComposer {
    pub fn new() -> Self {
        Self
    }

    fn card_section(card: &CardBrief, index: usize) -> String {
        let orientation_note = if card.orientation == "Reversed" {
            " (Reversed)"
        } else {
            ""
        };
        let because = BECAUSE_PHRASES[index % BECAUSE_PHRASES.len()];
        let ahead = AHEAD_PHRASES[index % AHEAD_PHRASES.len()];

        format!(
            "## {label}: {name}{orientation_note}\n\
             {name} represents {meaning}. {because} the {label} position asks \
             exactly that of you. {ahead} this thread to show itself in small, \
             concrete ways.\n",
            label = card.position_label,
            name = card.name,
            meaning = card.meaning,
        )
    }

    /// Render the full reading for a contract.
    pub fn render(contract: &PromptContract) -> String {
        let mut out = String::new();

        out.push_str(&format!(
            "## The Reading at a Glance\n\
             You asked, and the cards answered across {count} positions of the \
             {spread} spread. Hold your question loosely while each position \
             speaks in turn.\n\n",
            count = contract.cards.len(),
            spread = contract.spread_name,
        ));

        for (index, card) in contract.cards.iter().enumerate() {
            out.push_str(&Self::card_section(card, index));
            out.push('\n');
        }

        out.push_str(
            "## Guidance\n\
             Choose one small act this week that honors what the layout named. \
             Nothing here commands you; a reading offers weather, not orders.\n\n",
        );

        out.push_str(
            "## Closing Thoughts\n\
             Return to this reading in a quieter hour and notice which line \
             still rings true. That is the part to keep.\n",
        );

        out
    }
}

#[async_trait]
impl NarrativeBackend for LocalComposer {
    fn id(&self) -> &str {
        "local-composer"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::LocalComposer
    }

    async fn generate(
        &self,
        request: GenerationRequest<'_>,
    ) -> Result<GenerationResponse, BackendError> {
        let text = Self::render(request.contract);
        let completion_tokens = self.estimate_tokens(&text);

        Ok(GenerationResponse {
            text,
            usage: TokenUsage {
                prompt_tokens: 0,
                completion_tokens,
            },
            model: "local-template/1".to_string(),
        })
    }
}
