//! Deterministic safety patterns.
//!
//! These regex rules are the non-negotiable floor under the evaluation
//! gate: a hit here forces a block no matter what any model-assisted score
//! says. They cover clearly unsafe categories only — self-harm content,
//! coercive framing, and prohibited directive advice (medical, legal,
//! financial directives a reading must never issue).

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    // =========================================================================
    // SELF-HARM PATTERNS
    // =========================================================================

    static ref SELF_HARM_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)\bharm(ing)? (yourself|themselves)\b").unwrap(),
        Regex::new(r"(?i)\bhurt (yourself|themselves)\b").unwrap(),
        Regex::new(r"(?i)\bend (your|their) (own )?life\b").unwrap(),
        Regex::new(r"(?i)\btake (your|their) own life\b").unwrap(),
        Regex::new(r"(?i)\bself[- ]harm\b").unwrap(),
        Regex::new(r"(?i)\bnot worth living\b").unwrap(),
        Regex::new(r"(?i)\bbetter off (dead|gone|without you)\b").unwrap(),
        Regex::new(r"(?i)\bsuicid(e|al)\b").unwrap(),
    ];

    // =========================================================================
    // COERCION PATTERNS
    // =========================================================================

    static ref COERCION_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)\byou have no choice\b").unwrap(),
        Regex::new(r"(?i)\byou must obey\b").unwrap(),
        Regex::new(r"(?i)\bdo exactly as (the cards|i) say\b").unwrap(),
        Regex::new(r"(?i)\bor else\b").unwrap(),
        Regex::new(r"(?i)\bdon'?t tell anyone\b").unwrap(),
        Regex::new(r"(?i)\bno one will believe you\b").unwrap(),
        Regex::new(r"(?i)\bthe cards (command|demand|require) you\b").unwrap(),
    ];

    // =========================================================================
    // PROHIBITED DIRECTIVE ADVICE
    // =========================================================================

    static ref DIRECTIVE_ADVICE_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)\bstop taking (your )?medication\b").unwrap(),
        Regex::new(r"(?i)\brefuse (the |your )?treatment\b").unwrap(),
        Regex::new(r"(?i)\byou (must|should|need to) (leave|divorce) (your|him|her|them)\b")
            .unwrap(),
        Regex::new(r"(?i)\byou (must|should|need to) quit your job\b").unwrap(),
        Regex::new(r"(?i)\byou (must|should|need to) (invest|sell|buy)( all| everything)?\b")
            .unwrap(),
        Regex::new(r"(?i)\bignore (your|the) (doctor|lawyer|therapist)\b").unwrap(),
        Regex::new(r"(?i)\byou (must|should|need to) sue\b").unwrap(),
    ];
}

/// Unsafe content category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SafetyCategory {
    SelfHarm,
    Coercion,
    DirectiveAdvice,
}

impl std::fmt::Display for SafetyCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SafetyCategory::SelfHarm => write!(f, "self-harm"),
            SafetyCategory::Coercion => write!(f, "coercion"),
            SafetyCategory::DirectiveAdvice => write!(f, "directive advice"),
        }
    }
}

/// One matched safety pattern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SafetyHit {
    pub category: SafetyCategory,

    /// The exact text that matched.
    pub matched: String,
}

fn scan_category(
    text: &str,
    patterns: &[Regex],
    category: SafetyCategory,
    hits: &mut Vec<SafetyHit>,
) {
    for pattern in patterns {
        if let Some(m) = pattern.find(text) {
            hits.push(SafetyHit {
                category,
                matched: m.as_str().to_string(),
            });
        }
    }
}

/// Scan text for unsafe content. Empty result means the backstop passes.
pub fn scan(text: &str) -> Vec<SafetyHit> {
    let mut hits = Vec::new();
    scan_category(text, &SELF_HARM_PATTERNS, SafetyCategory::SelfHarm, &mut hits);
    scan_category(text, &COERCION_PATTERNS, SafetyCategory::Coercion, &mut hits);
    scan_category(
        text,
        &DIRECTIVE_ADVICE_PATTERNS,
        SafetyCategory::DirectiveAdvice,
        &mut hits,
    );
    hits
}

/// Convenience check.
pub fn is_unsafe(text: &str) -> bool {
    !scan(text).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_harm_phrasing_is_caught() {
        let hits = scan("The cards whisper that life is not worth living.");
        assert!(hits.iter().any(|h| h.category == SafetyCategory::SelfHarm));
    }

    #[test]
    fn coercive_framing_is_caught() {
        let hits = scan("You have no choice; the cards command you to act.");
        assert!(hits.iter().any(|h| h.category == SafetyCategory::Coercion));
        assert!(hits.len() >= 2);
    }

    #[test]
    fn directive_medical_advice_is_caught() {
        let hits = scan("The Tower says to stop taking your medication at once.");
        assert!(hits
            .iter()
            .any(|h| h.category == SafetyCategory::DirectiveAdvice));
    }

    #[test]
    fn directive_relationship_advice_is_caught() {
        assert!(is_unsafe("You must leave your partner before the moon turns."));
    }

    #[test]
    fn ordinary_reading_language_passes() {
        let text = "Death represents release. Strength invites patience; consider \
                    what you are ready to set down, and speak with someone you trust.";
        assert!(scan(text).is_empty());
    }

    #[test]
    fn reflective_mention_of_endings_passes() {
        assert!(!is_unsafe("An old habit ends so a gentler season can begin."));
    }

    #[test]
    fn scan_is_deterministic() {
        let text = "You have no choice, or else.";
        assert_eq!(scan(text), scan(text));
    }
}
