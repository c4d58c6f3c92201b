//! JSON Schema validation for catalog files.
//!
//! Deck and spread documents are validated against the schemas under
//! `spec/` before they enter the registry; a catalog file that parses as
//! YAML but violates the schema never reaches request handling.

use std::sync::OnceLock;
use thiserror::Error;

/// Embedded deck schema (loaded at compile time).
const DECK_SCHEMA_JSON: &str = include_str!("../../../../spec/deck.schema.json");

/// Embedded spread-set schema (loaded at compile time).
const SPREAD_SCHEMA_JSON: &str = include_str!("../../../../spec/spread.schema.json");

static DECK_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
static SPREAD_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors from schema loading.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),
}

fn get_validator(
    cell: &'static OnceLock<Result<jsonschema::Validator, String>>,
    raw: &str,
) -> Result<&'static jsonschema::Validator, SchemaError> {
    let result = cell.get_or_init(|| {
        let schema_value: serde_json::Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => return Err(format!("Invalid schema JSON: {}", e)),
        };

        match jsonschema::options().build(&schema_value) {
            Ok(v) => Ok(v),
            Err(e) => Err(format!("Failed to compile schema: {}", e)),
        }
    });

    match result {
        Ok(v) => Ok(v),
        Err(e) => Err(SchemaError::LoadError(e.clone())),
    }
}

fn validate(
    cell: &'static OnceLock<Result<jsonschema::Validator, String>>,
    raw: &str,
    instance: &serde_json::Value,
) -> Result<(), Vec<String>> {
    let validator = get_validator(cell, raw).map_err(|e| vec![e.to_string()])?;

    let errors: Vec<String> = validator
        .iter_errors(instance)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a deck document against the deck schema.
pub fn validate_deck_schema(deck_json: &serde_json::Value) -> Result<(), Vec<String>> {
    validate(&DECK_SCHEMA, DECK_SCHEMA_JSON, deck_json)
}

/// Validate a spread-set document against the spread schema.
pub fn validate_spread_schema(spread_json: &serde_json::Value) -> Result<(), Vec<String>> {
    validate(&SPREAD_SCHEMA, SPREAD_SCHEMA_JSON, spread_json)
}
