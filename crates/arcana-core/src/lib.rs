//! # arcana-core
//!
//! Deterministic core of the Arcana reading pipeline.
//!
//! This crate owns everything that must be reproducible and rule-based:
//! - the ritual-seeded card draw,
//! - pattern analysis over a finished draw,
//! - the structural quality gate,
//! - the deterministic safety patterns backing the evaluation gate,
//! - the immutable deck/spread catalog.
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: identical `(seed, deck, spread)` always yields the
//!    identical draw, and identical gate inputs the identical result
//! 2. **No model calls**: everything here is rule-based; generation and
//!    model-assisted scoring live in `arcana-runtime`
//! 3. **Immutable catalog**: deck/spread/template data is loaded once at
//!    startup and never mutated at request time
//!
//! ## Example
//!
//! ```rust,ignore
//! use arcana_core::{catalog::CatalogRegistry, draw, RitualSeed, StructuralGate};
//!
//! let registry = CatalogRegistry::builtin()?;
//! let deck = registry.deck("rws")?;
//! let spread = registry.spread("three-card")?;
//!
//! let seed = RitualSeed::new(vec![120, 480, 950], 17, "What now?", "rws");
//! let drawn = draw::draw(&seed, deck, spread)?;
//!
//! let gate = StructuralGate::default();
//! let result = gate.evaluate(&narrative, &drawn, spread, deck);
//! ```

pub mod catalog;
pub mod draw;
pub mod gate;
pub mod patterns;
pub mod safety;
pub mod types;

// Re-export main types at crate root
pub use catalog::{AliasTable, CatalogError, CatalogRegistry};
pub use draw::{assert_redraw_consistency, DrawError};
pub use gate::{GateConfig, SectionKind, StructuralGate};
pub use patterns::{analyze, JourneyStage, PatternSet};
pub use safety::{SafetyCategory, SafetyHit};
pub use types::{
    Arcana, Card, Deck, DrawnCard, GateCheck, GateIssue, GateMetrics, GateResult, Orientation,
    Position, Reading, ReadingState, RitualSeed, Severity, Spread, Suit,
};
