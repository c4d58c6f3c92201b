//! Core domain types for Arcana readings.
//!
//! Everything here is plain data: no I/O, no generation, no clocks beyond
//! the timestamps callers supply. The reading pipeline passes these types
//! between the draw engine, the pattern analyzer, and the gates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Deterministic seed derived from the user's ritual inputs.
///
/// The numeric seed is folded once at construction and never recomputed;
/// identical inputs always produce the identical seed value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RitualSeed {
    /// Ordered knock timestamps (unix millis).
    pub knock_events: Vec<i64>,

    /// Where the querent cut the deck.
    pub cut_index: u32,

    /// The question asked of the cards.
    pub question_text: String,

    /// Deck the ritual was performed over.
    pub deck_id: String,

    /// Folded 64-bit seed value.
    seed: u64,
}

impl RitualSeed {
    /// Fold ritual inputs into a seed.
    pub fn new(
        knock_events: Vec<i64>,
        cut_index: u32,
        question_text: impl Into<String>,
        deck_id: impl Into<String>,
    ) -> Self {
        let question_text = question_text.into();
        let deck_id = deck_id.into();
        let seed = fold_seed(&knock_events, cut_index, &question_text, &deck_id);
        Self {
            knock_events,
            cut_index,
            question_text,
            deck_id,
            seed,
        }
    }

    /// The folded seed value driving the draw stream.
    pub fn value(&self) -> u64 {
        self.seed
    }
}

/// FNV-1a fold over the ritual inputs.
///
/// FNV is used instead of `DefaultHasher` because the seed must be stable
/// across processes, platforms, and Rust releases.
fn fold_seed(knock_events: &[i64], cut_index: u32, question_text: &str, deck_id: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET;
    let mut eat = |bytes: &[u8]| {
        for b in bytes {
            hash ^= u64::from(*b);
            hash = hash.wrapping_mul(PRIME);
        }
    };

    for knock in knock_events {
        eat(&knock.to_le_bytes());
    }
    eat(&cut_index.to_le_bytes());
    eat(question_text.as_bytes());
    eat(deck_id.as_bytes());
    hash
}

/// Major or minor arcana.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Arcana {
    Major,
    Minor,
}

/// Minor arcana suit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Wands,
    Cups,
    Swords,
    Pentacles,
}

impl Suit {
    /// The elementally opposed suit (fire/water, air/earth).
    pub fn opposed(self) -> Suit {
        match self {
            Suit::Wands => Suit::Cups,
            Suit::Cups => Suit::Wands,
            Suit::Swords => Suit::Pentacles,
            Suit::Pentacles => Suit::Swords,
        }
    }
}

impl std::fmt::Display for Suit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Suit::Wands => write!(f, "Wands"),
            Suit::Cups => write!(f, "Cups"),
            Suit::Swords => write!(f, "Swords"),
            Suit::Pentacles => write!(f, "Pentacles"),
        }
    }
}

/// A single card in a deck catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Card {
    /// Stable identifier within the deck (e.g. "major-13", "cups-02").
    pub id: String,

    /// Canonical display name.
    pub name: String,

    /// Deck-specific name variants (other traditions' titles).
    #[serde(default)]
    pub aliases: Vec<String>,

    pub arcana: Arcana,

    /// Major arcana numeral (0..=21).
    #[serde(default)]
    pub number: Option<u8>,

    /// Minor arcana suit.
    #[serde(default)]
    pub suit: Option<Suit>,

    /// Minor arcana rank: ace=1..ten=10, page=11, knight=12, queen=13, king=14.
    #[serde(default)]
    pub rank: Option<u8>,

    /// Upright meaning.
    pub upright: String,

    /// Reversed meaning.
    pub reversed: String,
}

impl Card {
    /// All names this card answers to: canonical name first, then aliases.
    pub fn known_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// An ordered deck of cards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deck {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub cards: Vec<Card>,
}

impl Deck {
    /// Case-insensitive lookup by canonical name or alias.
    pub fn find_by_name(&self, name: &str) -> Option<&Card> {
        self.cards
            .iter()
            .find(|c| c.known_names().any(|n| n.eq_ignore_ascii_case(name)))
    }

    /// Lookup by card id.
    pub fn find_by_id(&self, id: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.id == id)
    }
}

/// One position in a spread layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    /// Display label shown to the querent (e.g. "Near Future").
    pub label: String,

    /// Stable semantic role key (e.g. "near_future").
    pub role_key: String,

    /// How much narrative attention this position deserves, in [0, 1].
    pub attention_weight: f64,
}

/// A named layout of positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spread {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub positions: Vec<Position>,
}

/// Card orientation after the draw.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Upright,
    Reversed,
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Orientation::Upright => write!(f, "Upright"),
            Orientation::Reversed => write!(f, "Reversed"),
        }
    }
}

/// A card assigned to a spread position by the draw engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrawnCard {
    pub card: Card,
    pub position: Position,
    pub orientation: Orientation,

    /// Zero-based order within the draw; matches position-definition order.
    pub index: usize,
}

impl DrawnCard {
    /// The meaning text matching this card's orientation.
    pub fn meaning(&self) -> &str {
        match self.orientation {
            Orientation::Upright => &self.card.upright,
            Orientation::Reversed => &self.card.reversed,
        }
    }
}

/// Which structural check produced an issue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GateCheck {
    Sections,
    Coverage,
    HighWeightPosition,
    Hallucination,
    Spine,
}

/// Issue severity. Only `Error` issues fail the gate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A single finding from the structural gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateIssue {
    pub check: GateCheck,
    pub severity: Severity,
    pub detail: String,
}

/// Quantitative gate metrics, reported alongside pass/fail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateMetrics {
    /// Fraction of drawn cards mentioned by name or alias.
    pub coverage_ratio: f64,

    /// Distinct undrawn catalog cards found in the text.
    pub hallucination_count: usize,

    /// Fraction of card sections with a complete narrative spine.
    pub spine_completion_ratio: f64,
}

/// Result of a structural gate evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateResult {
    pub passed: bool,
    pub issues: Vec<GateIssue>,
    pub metrics: GateMetrics,
}

impl GateResult {
    /// Issues at `Error` severity.
    pub fn errors(&self) -> impl Iterator<Item = &GateIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }
}

/// Lifecycle state of a reading. Transitions `Generating -> Accepted | Failed`
/// exactly once; a terminal reading is immutable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReadingState {
    Generating,
    Accepted,
    Failed,
}

/// A finished reading record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    pub id: Uuid,
    pub state: ReadingState,
    pub spread_key: String,
    pub drawn_cards: Vec<DrawnCard>,
    pub question: String,

    /// The narrative as accepted by the structural gate. Retained on blocked
    /// readings for quarantine review; never surfaced to the querent then.
    pub narrative_text: String,

    /// Backend whose attempt actually passed the structural gate.
    pub accepted_backend_id: Option<String>,

    pub structural_gate_result: Option<GateResult>,

    /// Serialized evaluation-gate outcome, when the second stage ran.
    pub evaluation_gate_result: Option<serde_json::Value>,

    /// Prompt contract version of the winning attempt.
    pub prompt_version: Option<String>,

    pub created_at: DateTime<Utc>,
}
