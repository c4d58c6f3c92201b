//! Cross-deck card-name aliasing.
//!
//! Different traditions title the same trump differently (one deck's
//! "Justice" is another's "Adjustment"). Equivalence is data, not
//! inference: an alias table maps card ids to extra accepted names and is
//! merged into a deck before the registry freezes. Nothing in the pipeline
//! guesses at name equivalence.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::Deck;

/// A pluggable table of extra names per card id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AliasTable {
    /// card id -> additional accepted names
    #[serde(default)]
    pub entries: HashMap<String, Vec<String>>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a table from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Add one alias for a card id.
    pub fn add(&mut self, card_id: impl Into<String>, alias: impl Into<String>) {
        self.entries
            .entry(card_id.into())
            .or_default()
            .push(alias.into());
    }

    /// Merge this table into a deck, skipping names the card already knows.
    pub fn apply(&self, deck: &mut Deck) {
        for card in &mut deck.cards {
            if let Some(extra) = self.entries.get(&card.id) {
                for alias in extra {
                    let known = card
                        .known_names()
                        .any(|n| n.eq_ignore_ascii_case(alias));
                    if !known {
                        card.aliases.push(alias.clone());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Arcana, Card};

    fn deck_with_justice() -> Deck {
        Deck {
            id: "rws".into(),
            name: "Test".into(),
            description: None,
            cards: vec![Card {
                id: "major-11".into(),
                name: "Justice".into(),
                aliases: vec![],
                arcana: Arcana::Major,
                number: Some(11),
                suit: None,
                rank: None,
                upright: "fairness".into(),
                reversed: "imbalance".into(),
            }],
        }
    }

    #[test]
    fn applies_aliases_by_card_id() {
        let mut deck = deck_with_justice();
        let mut table = AliasTable::new();
        table.add("major-11", "Adjustment");
        table.apply(&mut deck);

        assert!(deck.find_by_name("Adjustment").is_some());
    }

    #[test]
    fn skips_duplicate_aliases() {
        let mut deck = deck_with_justice();
        deck.cards[0].aliases.push("Adjustment".into());

        let mut table = AliasTable::new();
        table.add("major-11", "adjustment");
        table.apply(&mut deck);

        assert_eq!(deck.cards[0].aliases.len(), 1);
    }

    #[test]
    fn parses_from_yaml() {
        let table = AliasTable::from_yaml("entries:\n  major-11: [Adjustment]\n").unwrap();
        assert_eq!(table.entries["major-11"], vec!["Adjustment".to_string()]);
    }
}
