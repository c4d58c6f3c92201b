//! Hallucinated-card detection.
//!
//! Any catalog card name appearing in the narrative without being part of
//! the draw is a hallucination, and a single hallucination fails the gate.
//! A documented allowlist excludes trump titles that double as ordinary
//! interpretive vocabulary ("strength", "justice", ...); titles carrying
//! their article ("The Tower", "The Sun") are always detected.

use std::collections::HashSet;

use crate::gate::coverage::whole_word_present;
use crate::types::{Deck, DrawnCard};

/// Trump titles that read as common nouns in interpretive prose.
pub const DEFAULT_ALLOWLIST: &[&str] = &["strength", "justice", "temperance", "judgement", "death"];

/// Distinct canonical names of undrawn catalog cards found in the text.
pub fn find_hallucinations(
    text: &str,
    deck: &Deck,
    drawn: &[DrawnCard],
    allowlist: &[String],
) -> Vec<String> {
    let drawn_ids: HashSet<&str> = drawn.iter().map(|d| d.card.id.as_str()).collect();

    let mut hallucinated = Vec::new();
    for card in &deck.cards {
        if drawn_ids.contains(card.id.as_str()) {
            continue;
        }

        let found = card.known_names().any(|name| {
            let generic = allowlist.iter().any(|a| a.eq_ignore_ascii_case(name));
            !generic && whole_word_present(text, name)
        });

        if found {
            hallucinated.push(card.name.clone());
        }
    }

    hallucinated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogRegistry;
    use crate::types::{Orientation, Position};

    fn allowlist() -> Vec<String> {
        DEFAULT_ALLOWLIST.iter().map(|s| s.to_string()).collect()
    }

    fn draw_of(names: &[&str]) -> (Deck, Vec<DrawnCard>) {
        let registry = CatalogRegistry::builtin().unwrap();
        let deck = registry.deck("rws").unwrap().clone();
        let drawn = names
            .iter()
            .enumerate()
            .map(|(i, name)| DrawnCard {
                card: deck.find_by_name(name).unwrap().clone(),
                position: Position {
                    label: format!("P{i}"),
                    role_key: format!("p{i}"),
                    attention_weight: 0.5,
                },
                orientation: Orientation::Upright,
                index: i,
            })
            .collect();
        (deck, drawn)
    }

    #[test]
    fn undrawn_card_name_is_flagged() {
        let (deck, drawn) = draw_of(&["The Fool"]);
        let text = "The Fool steps out while The Tower looms behind.";
        let found = find_hallucinations(text, &deck, &drawn, &allowlist());
        assert_eq!(found, vec!["The Tower".to_string()]);
    }

    #[test]
    fn drawn_cards_are_never_hallucinations() {
        let (deck, drawn) = draw_of(&["The Fool", "The Tower"]);
        let text = "The Fool steps out while The Tower looms behind.";
        let found = find_hallucinations(text, &deck, &drawn, &allowlist());
        assert!(found.is_empty());
    }

    #[test]
    fn undrawn_alias_is_flagged_under_the_canonical_name() {
        let (deck, drawn) = draw_of(&["The Fool"]);
        let text = "The Fool meets The Universe at the end of the road.";
        let found = find_hallucinations(text, &deck, &drawn, &allowlist());
        assert_eq!(found, vec!["The World".to_string()]);
    }

    #[test]
    fn allowlisted_titles_pass_as_ordinary_words() {
        let (deck, drawn) = draw_of(&["The Fool"]);
        let text = "It takes strength and a sense of justice to begin again.";
        let found = find_hallucinations(text, &deck, &drawn, &allowlist());
        assert!(found.is_empty());
    }

    #[test]
    fn empty_allowlist_restores_strict_detection() {
        let (deck, drawn) = draw_of(&["The Fool"]);
        let text = "It takes strength to begin again.";
        let found = find_hallucinations(text, &deck, &drawn, &[]);
        assert_eq!(found, vec!["Strength".to_string()]);
    }

    #[test]
    fn substring_of_a_card_name_is_not_flagged() {
        let (deck, drawn) = draw_of(&["The Fool"]);
        let text = "A Deathly quiet settles, nothing more.";
        let found = find_hallucinations(text, &deck, &drawn, &[]);
        assert!(found.is_empty());
    }
}
