//! Multi-card pattern analysis.
//!
//! Pure functions over a finished draw. A [`PatternSet`] is derived state:
//! it is recomputed on demand from the drawn cards and never persisted on
//! its own.

use serde::{Deserialize, Serialize};

use crate::types::{Arcana, DrawnCard, Suit};

/// How two drawn cards relate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DyadKind {
    /// Two minors sharing the same rank.
    SharedRank,

    /// Two minors in elementally opposed suits.
    OpposedSuits,

    /// Two majors whose numerals mirror each other across the trump sequence
    /// (their numbers sum to 21).
    MirroredMajors,
}

/// A two-card relationship.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dyad {
    pub kind: DyadKind,
    /// Card names in draw order.
    pub cards: [String; 2],
}

/// How three drawn cards cluster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriadKind {
    /// Three or more majors in one draw.
    MajorConfluence,

    /// Three or more cards of a single suit.
    SuitRun,
}

/// A three-card cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Triad {
    pub kind: TriadKind,
    /// The first three member names in draw order.
    pub cards: [String; 3],
}

/// Where on the trump sequence the draw's majors sit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JourneyStage {
    /// Highest trump 0..=7: departures and first forces.
    Threshold,

    /// Highest trump 8..=14: trials and turning wheels.
    Trials,

    /// Highest trump 15..=21: reckonings and completion.
    Integration,
}

/// A run of one suit whose ranks move monotonically in draw order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuitProgression {
    pub suit: Suit,
    /// Member card names in draw order.
    pub cards: Vec<String>,
    /// True when ranks strictly ascend through the draw, false when they
    /// strictly descend.
    pub ascending: bool,
}

/// Derived relationship metadata for one draw.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PatternSet {
    pub triads: Vec<Triad>,
    pub dyads: Vec<Dyad>,
    pub journey_stage: Option<JourneyStage>,
    pub suit_progressions: Vec<SuitProgression>,
}

impl PatternSet {
    pub fn is_empty(&self) -> bool {
        self.triads.is_empty()
            && self.dyads.is_empty()
            && self.journey_stage.is_none()
            && self.suit_progressions.is_empty()
    }
}

/// Analyze a draw into its pattern set.
pub fn analyze(drawn: &[DrawnCard]) -> PatternSet {
    PatternSet {
        triads: find_triads(drawn),
        dyads: find_dyads(drawn),
        journey_stage: journey_stage(drawn),
        suit_progressions: suit_progressions(drawn),
    }
}

fn find_dyads(drawn: &[DrawnCard]) -> Vec<Dyad> {
    let mut dyads = Vec::new();

    for (i, a) in drawn.iter().enumerate() {
        for b in &drawn[i + 1..] {
            let pair = [a.card.name.clone(), b.card.name.clone()];

            match (a.card.arcana, b.card.arcana) {
                (Arcana::Minor, Arcana::Minor) => {
                    let same_rank = matches!(
                        (a.card.rank, b.card.rank),
                        (Some(ra), Some(rb)) if ra == rb
                    );
                    let opposed = matches!(
                        (a.card.suit, b.card.suit),
                        (Some(sa), Some(sb)) if sa.opposed() == sb
                    );

                    if same_rank {
                        dyads.push(Dyad {
                            kind: DyadKind::SharedRank,
                            cards: pair,
                        });
                    } else if opposed {
                        dyads.push(Dyad {
                            kind: DyadKind::OpposedSuits,
                            cards: pair,
                        });
                    }
                }
                (Arcana::Major, Arcana::Major) => {
                    if let (Some(na), Some(nb)) = (a.card.number, b.card.number) {
                        if na + nb == 21 {
                            dyads.push(Dyad {
                                kind: DyadKind::MirroredMajors,
                                cards: pair,
                            });
                        }
                    }
                }
                _ => {}
            }
        }
    }

    dyads
}

fn find_triads(drawn: &[DrawnCard]) -> Vec<Triad> {
    let mut triads = Vec::new();

    let majors: Vec<&DrawnCard> = drawn
        .iter()
        .filter(|d| d.card.arcana == Arcana::Major)
        .collect();
    if majors.len() >= 3 {
        triads.push(Triad {
            kind: TriadKind::MajorConfluence,
            cards: [
                majors[0].card.name.clone(),
                majors[1].card.name.clone(),
                majors[2].card.name.clone(),
            ],
        });
    }

    for suit in [Suit::Wands, Suit::Cups, Suit::Swords, Suit::Pentacles] {
        let members: Vec<&DrawnCard> = drawn
            .iter()
            .filter(|d| d.card.suit == Some(suit))
            .collect();
        if members.len() >= 3 {
            triads.push(Triad {
                kind: TriadKind::SuitRun,
                cards: [
                    members[0].card.name.clone(),
                    members[1].card.name.clone(),
                    members[2].card.name.clone(),
                ],
            });
        }
    }

    triads
}

fn journey_stage(drawn: &[DrawnCard]) -> Option<JourneyStage> {
    let highest = drawn
        .iter()
        .filter(|d| d.card.arcana == Arcana::Major)
        .filter_map(|d| d.card.number)
        .max()?;

    Some(match highest {
        0..=7 => JourneyStage::Threshold,
        8..=14 => JourneyStage::Trials,
        _ => JourneyStage::Integration,
    })
}

fn suit_progressions(drawn: &[DrawnCard]) -> Vec<SuitProgression> {
    let mut progressions = Vec::new();

    for suit in [Suit::Wands, Suit::Cups, Suit::Swords, Suit::Pentacles] {
        let members: Vec<&DrawnCard> = drawn
            .iter()
            .filter(|d| d.card.suit == Some(suit))
            .collect();
        if members.len() < 3 {
            continue;
        }

        let ranks: Vec<u8> = members.iter().filter_map(|d| d.card.rank).collect();
        if ranks.len() != members.len() {
            continue;
        }

        let ascending = ranks.windows(2).all(|w| w[0] < w[1]);
        let descending = ranks.windows(2).all(|w| w[0] > w[1]);
        if !(ascending || descending) {
            continue;
        }

        progressions.push(SuitProgression {
            suit,
            cards: members.iter().map(|d| d.card.name.clone()).collect(),
            ascending,
        });
    }

    progressions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Card, Orientation, Position};

    fn position(i: usize) -> Position {
        Position {
            label: format!("P{i}"),
            role_key: format!("p{i}"),
            attention_weight: 0.5,
        }
    }

    fn major(name: &str, number: u8, index: usize) -> DrawnCard {
        DrawnCard {
            card: Card {
                id: format!("major-{number:02}"),
                name: name.into(),
                aliases: vec![],
                arcana: Arcana::Major,
                number: Some(number),
                suit: None,
                rank: None,
                upright: "up".into(),
                reversed: "down".into(),
            },
            position: position(index),
            orientation: Orientation::Upright,
            index,
        }
    }

    fn minor(name: &str, suit: Suit, rank: u8, index: usize) -> DrawnCard {
        DrawnCard {
            card: Card {
                id: format!("{suit}-{rank:02}").to_lowercase(),
                name: name.into(),
                aliases: vec![],
                arcana: Arcana::Minor,
                number: None,
                suit: Some(suit),
                rank: Some(rank),
                upright: "up".into(),
                reversed: "down".into(),
            },
            position: position(index),
            orientation: Orientation::Upright,
            index,
        }
    }

    #[test]
    fn shared_rank_dyad_detected() {
        let drawn = vec![
            minor("Five of Cups", Suit::Cups, 5, 0),
            minor("Five of Swords", Suit::Swords, 5, 1),
        ];
        let set = analyze(&drawn);
        assert_eq!(set.dyads.len(), 1);
        assert_eq!(set.dyads[0].kind, DyadKind::SharedRank);
    }

    #[test]
    fn opposed_suit_dyad_detected() {
        let drawn = vec![
            minor("Two of Wands", Suit::Wands, 2, 0),
            minor("Seven of Cups", Suit::Cups, 7, 1),
        ];
        let set = analyze(&drawn);
        assert_eq!(set.dyads.len(), 1);
        assert_eq!(set.dyads[0].kind, DyadKind::OpposedSuits);
    }

    #[test]
    fn shared_rank_outranks_opposed_suits() {
        let drawn = vec![
            minor("Five of Wands", Suit::Wands, 5, 0),
            minor("Five of Cups", Suit::Cups, 5, 1),
        ];
        let set = analyze(&drawn);
        assert_eq!(set.dyads.len(), 1);
        assert_eq!(set.dyads[0].kind, DyadKind::SharedRank);
    }

    #[test]
    fn mirrored_majors_dyad_detected() {
        let drawn = vec![major("The Magician", 1, 0), major("The World", 21, 1)];
        let set = analyze(&drawn);
        assert_eq!(set.dyads.len(), 1);
        assert_eq!(set.dyads[0].kind, DyadKind::MirroredMajors);
        assert_eq!(set.dyads[0].cards[0], "The Magician");
    }

    #[test]
    fn major_confluence_and_journey_stage() {
        let drawn = vec![
            major("The Fool", 0, 0),
            major("Death", 13, 1),
            major("The Tower", 16, 2),
        ];
        let set = analyze(&drawn);
        assert!(set
            .triads
            .iter()
            .any(|t| t.kind == TriadKind::MajorConfluence));
        assert_eq!(set.journey_stage, Some(JourneyStage::Integration));
    }

    #[test]
    fn no_majors_means_no_journey_stage() {
        let drawn = vec![minor("Ace of Wands", Suit::Wands, 1, 0)];
        assert_eq!(analyze(&drawn).journey_stage, None);
    }

    #[test]
    fn ascending_suit_progression_detected() {
        let drawn = vec![
            minor("Two of Wands", Suit::Wands, 2, 0),
            minor("Five of Wands", Suit::Wands, 5, 1),
            minor("Nine of Wands", Suit::Wands, 9, 2),
        ];
        let set = analyze(&drawn);

        assert_eq!(set.suit_progressions.len(), 1);
        assert!(set.suit_progressions[0].ascending);
        assert!(set.triads.iter().any(|t| t.kind == TriadKind::SuitRun));
    }

    #[test]
    fn unordered_suit_cluster_is_a_run_but_not_a_progression() {
        let drawn = vec![
            minor("Nine of Wands", Suit::Wands, 9, 0),
            minor("Two of Wands", Suit::Wands, 2, 1),
            minor("Five of Wands", Suit::Wands, 5, 2),
        ];
        let set = analyze(&drawn);

        assert!(set.suit_progressions.is_empty());
        assert!(set.triads.iter().any(|t| t.kind == TriadKind::SuitRun));
    }

    #[test]
    fn analysis_is_pure_and_repeatable() {
        let drawn = vec![
            major("The Fool", 0, 0),
            minor("Two of Cups", Suit::Cups, 2, 1),
            minor("Two of Swords", Suit::Swords, 2, 2),
        ];
        assert_eq!(analyze(&drawn), analyze(&drawn));
    }
}
