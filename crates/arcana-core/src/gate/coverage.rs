//! Card coverage checks.
//!
//! Every drawn card must appear in the narrative by canonical name or a
//! registered alias, as a whole-word, case-insensitive match — "Death"
//! inside "Deathly" does not count. Positions carrying more than the
//! configured attention weight must additionally be referenced.

use regex::Regex;

use crate::types::DrawnCard;

/// Whole-word, case-insensitive presence of `term` in `text`.
pub fn whole_word_present(text: &str, term: &str) -> bool {
    let pattern = format!(r"(?i)\b{}\b", regex::escape(term));
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(text),
        // An unbuildable pattern can only come from a degenerate term; treat
        // it as absent rather than failing the whole gate.
        Err(_) => false,
    }
}

/// Whether any of the card's known names appears whole-word in the text.
pub fn card_mentioned(text: &str, card: &DrawnCard) -> bool {
    card.card
        .known_names()
        .any(|name| whole_word_present(text, name))
}

/// Coverage assessment over a full draw.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageOutcome {
    /// Canonical names of cards never mentioned.
    pub missing: Vec<String>,

    /// `(position label, card name)` pairs for unreferenced high-weight
    /// positions.
    pub missing_high_weight: Vec<(String, String)>,

    /// mentioned / drawn.
    pub ratio: f64,
}

/// Assess coverage of drawn cards and high-weight positions.
pub fn assess_coverage(
    text: &str,
    drawn: &[DrawnCard],
    attention_weight_threshold: f64,
) -> CoverageOutcome {
    let mut missing = Vec::new();
    let mut missing_high_weight = Vec::new();
    let mut mentioned = 0usize;

    for dc in drawn {
        let card_present = card_mentioned(text, dc);
        if card_present {
            mentioned += 1;
        } else {
            missing.push(dc.card.name.clone());
        }

        if dc.position.attention_weight > attention_weight_threshold {
            let referenced = card_present || whole_word_present(text, &dc.position.label);
            if !referenced {
                missing_high_weight.push((dc.position.label.clone(), dc.card.name.clone()));
            }
        }
    }

    let ratio = if drawn.is_empty() {
        1.0
    } else {
        mentioned as f64 / drawn.len() as f64
    };

    CoverageOutcome {
        missing,
        missing_high_weight,
        ratio,
    }
}
