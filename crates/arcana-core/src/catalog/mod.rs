//! Immutable deck/spread catalog.
//!
//! Catalog data is loaded once at startup, validated, and frozen into a
//! [`CatalogRegistry`] that components receive by shared reference. Nothing
//! mutates catalog state at request time.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::types::{Arcana, Deck, Spread};

pub mod alias;
pub mod schema;

pub use alias::AliasTable;

/// Built-in Rider-Waite-Smith deck shipped with the crate.
const BUILTIN_DECK_YAML: &str = include_str!("../../assets/decks/rider_waite_smith.yaml");

/// Built-in spread layouts shipped with the crate.
const BUILTIN_SPREADS_YAML: &str = include_str!("../../assets/spreads.yaml");

/// Errors from catalog loading and lookup.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Catalog validation failed: {0}")]
    ValidationError(String),

    #[error("Unknown deck: {0}")]
    UnknownDeck(String),

    #[error("Unknown spread: {0}")]
    UnknownSpread(String),
}

#[derive(serde::Deserialize)]
struct SpreadSet {
    spreads: Vec<Spread>,
}

/// Parse and validate a deck document.
pub fn parse_deck(yaml: &str) -> Result<Deck, CatalogError> {
    let value: serde_json::Value = serde_yaml::from_str(yaml)?;
    schema::validate_deck_schema(&value)
        .map_err(|errors| CatalogError::ValidationError(errors.join("; ")))?;

    let deck: Deck = serde_json::from_value(value)?;
    check_deck(&deck)?;
    Ok(deck)
}

/// Parse and validate a spread-set document.
pub fn parse_spreads(yaml: &str) -> Result<Vec<Spread>, CatalogError> {
    let value: serde_json::Value = serde_yaml::from_str(yaml)?;
    schema::validate_spread_schema(&value)
        .map_err(|errors| CatalogError::ValidationError(errors.join("; ")))?;

    let set: SpreadSet = serde_json::from_value(value)?;
    for spread in &set.spreads {
        check_spread(spread)?;
    }
    Ok(set.spreads)
}

/// Semantic checks the schema cannot express.
fn check_deck(deck: &Deck) -> Result<(), CatalogError> {
    let mut seen_ids = HashMap::new();
    for card in &deck.cards {
        if seen_ids.insert(card.id.clone(), ()).is_some() {
            return Err(CatalogError::ValidationError(format!(
                "duplicate card id '{}' in deck '{}'",
                card.id, deck.id
            )));
        }

        match card.arcana {
            Arcana::Major if card.number.is_none() => {
                return Err(CatalogError::ValidationError(format!(
                    "major arcana card '{}' is missing its numeral",
                    card.name
                )));
            }
            Arcana::Minor if card.suit.is_none() || card.rank.is_none() => {
                return Err(CatalogError::ValidationError(format!(
                    "minor arcana card '{}' is missing suit or rank",
                    card.name
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

fn check_spread(spread: &Spread) -> Result<(), CatalogError> {
    let mut seen = HashMap::new();
    for position in &spread.positions {
        if seen.insert(position.role_key.clone(), ()).is_some() {
            return Err(CatalogError::ValidationError(format!(
                "duplicate position role '{}' in spread '{}'",
                position.role_key, spread.key
            )));
        }
    }
    Ok(())
}

/// Read-only registry of decks and spreads.
///
/// Built once, then shared. The builder methods consume `&mut self` and are
/// intended for startup wiring only; once behind an `Arc` the registry is
/// effectively frozen.
#[derive(Debug, Default)]
pub struct CatalogRegistry {
    decks: HashMap<String, Deck>,
    spreads: HashMap<String, Spread>,
}

impl CatalogRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in deck and spreads.
    pub fn builtin() -> Result<Self, CatalogError> {
        let mut registry = Self::new();
        registry.insert_deck(parse_deck(BUILTIN_DECK_YAML)?);
        for spread in parse_spreads(BUILTIN_SPREADS_YAML)? {
            registry.insert_spread(spread);
        }
        Ok(registry)
    }

    /// Add a deck, replacing any deck with the same id.
    pub fn insert_deck(&mut self, deck: Deck) {
        self.decks.insert(deck.id.clone(), deck);
    }

    /// Add a spread, replacing any spread with the same key.
    pub fn insert_spread(&mut self, spread: Spread) {
        self.spreads.insert(spread.key.clone(), spread);
    }

    /// Load a deck from a YAML file on disk.
    pub fn load_deck_file(&mut self, path: impl AsRef<Path>) -> Result<(), CatalogError> {
        let yaml = fs::read_to_string(path)?;
        self.insert_deck(parse_deck(&yaml)?);
        Ok(())
    }

    /// Load spreads from a YAML file on disk.
    pub fn load_spread_file(&mut self, path: impl AsRef<Path>) -> Result<(), CatalogError> {
        let yaml = fs::read_to_string(path)?;
        for spread in parse_spreads(&yaml)? {
            self.insert_spread(spread);
        }
        Ok(())
    }

    /// Merge an alias table into a registered deck.
    pub fn apply_aliases(&mut self, deck_id: &str, table: &AliasTable) -> Result<(), CatalogError> {
        let deck = self
            .decks
            .get_mut(deck_id)
            .ok_or_else(|| CatalogError::UnknownDeck(deck_id.to_string()))?;
        table.apply(deck);
        Ok(())
    }

    /// Look up a deck by id.
    pub fn deck(&self, id: &str) -> Result<&Deck, CatalogError> {
        self.decks
            .get(id)
            .ok_or_else(|| CatalogError::UnknownDeck(id.to_string()))
    }

    /// Look up a spread by key.
    pub fn spread(&self, key: &str) -> Result<&Spread, CatalogError> {
        self.spreads
            .get(key)
            .ok_or_else(|| CatalogError::UnknownSpread(key.to_string()))
    }

    /// Registered deck ids.
    pub fn deck_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.decks.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Registered spread keys.
    pub fn spread_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.spreads.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}
