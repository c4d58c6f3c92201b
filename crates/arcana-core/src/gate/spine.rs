//! Narrative-spine detection.
//!
//! A complete card section names WHAT the card is and says, and covers at
//! least one of WHY (causal or contextual language) or WHAT'S-NEXT
//! (forward-looking language). Opening, closing, and action sections are
//! exempt. Detectors are named functions returning `{matched, confidence}`
//! so a model-based detector can replace any of them in place.

use crate::gate::coverage::whole_word_present;
use crate::types::DrawnCard;

/// Outcome of one spine-signal detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalOutcome {
    pub matched: bool,
    pub confidence: f64,
}

impl SignalOutcome {
    fn from_hits(hits: usize) -> Self {
        match hits {
            0 => SignalOutcome {
                matched: false,
                confidence: 0.8,
            },
            1 => SignalOutcome {
                matched: true,
                confidence: 0.7,
            },
            _ => SignalOutcome {
                matched: true,
                confidence: 0.9,
            },
        }
    }
}

const DESCRIPTIVE_CUES: &[&str] = &[
    "represents",
    "signifies",
    "speaks",
    "reflects",
    "embodies",
    "suggests",
    "stands for",
    "points to",
    "reveals",
    "carries",
    "shows",
];

const CAUSAL_CUES: &[&str] = &[
    "because",
    "since",
    "as a result",
    "stems from",
    "rooted in",
    "due to",
    "owing to",
    "comes from",
    "shaped by",
    "born of",
    "in response to",
];

const FORWARD_CUES: &[&str] = &[
    "will",
    "ahead",
    "expect",
    "coming",
    "prepare",
    "unfold",
    "soon",
    "toward",
    "watch for",
    "invites you",
    "in the days",
    "in the weeks",
    "next",
];

fn count_cues(text: &str, cues: &[&str]) -> usize {
    let lower = text.to_lowercase();
    cues.iter().filter(|cue| lower.contains(*cue)).count()
}

/// WHAT: the section names one of the drawn cards and describes it.
pub fn detect_what(body: &str, header: &str, drawn: &[DrawnCard]) -> SignalOutcome {
    let names_card = drawn.iter().any(|dc| {
        dc.card
            .known_names()
            .any(|n| whole_word_present(body, n) || whole_word_present(header, n))
    });
    if !names_card {
        return SignalOutcome {
            matched: false,
            confidence: 0.9,
        };
    }

    let descriptive = count_cues(body, DESCRIPTIVE_CUES);
    SignalOutcome::from_hits(descriptive)
}

/// WHY: causal or contextual language.
pub fn detect_why(body: &str) -> SignalOutcome {
    SignalOutcome::from_hits(count_cues(body, CAUSAL_CUES))
}

/// WHAT'S-NEXT: forward-looking language.
pub fn detect_whats_next(body: &str) -> SignalOutcome {
    SignalOutcome::from_hits(count_cues(body, FORWARD_CUES))
}

/// Whether one card section has a complete spine.
pub fn section_complete(body: &str, header: &str, drawn: &[DrawnCard]) -> bool {
    detect_what(body, header, drawn).matched
        && (detect_why(body).matched || detect_whats_next(body).matched)
}
