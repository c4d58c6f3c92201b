//! Section detection and classification.
//!
//! Narratives are split on markdown-style headings or single-line bold
//! headers. Header lines are capped at a configurable length so an ordinary
//! bold sentence is not misread as a header. Classification is keyword
//! matching; classifiers return a structured outcome with a confidence so a
//! model-based classifier can replace them without touching call sites.

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::{DrawnCard, Spread};

lazy_static! {
    /// Markdown heading: `# Title` through `###### Title`.
    static ref MD_HEADING: Regex = Regex::new(r"^#{1,6}\s+(.+?)\s*$").unwrap();

    /// Single-line bold header: `**Title**` with an optional trailing colon.
    static ref BOLD_HEADING: Regex = Regex::new(r"^\*\*(.+?)\*\*:?\s*$").unwrap();
}

/// What a section appears to be about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Opening,
    Card,
    Action,
    Closing,
    Unknown,
}

/// Outcome of a heuristic classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub kind: SectionKind,
    pub confidence: f64,
}

/// One detected section of a narrative.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub header: String,
    pub body: String,
    pub kind: SectionKind,
    pub confidence: f64,
}

const OPENING_CUES: &[&str] = &[
    "opening",
    "overview",
    "introduction",
    "at a glance",
    "welcome",
    "the reading",
];

const CLOSING_CUES: &[&str] = &[
    "closing",
    "summary",
    "final",
    "takeaway",
    "conclusion",
    "in closing",
    "parting",
];

const ACTION_CUES: &[&str] = &[
    "action",
    "guidance",
    "advice",
    "practice",
    "next steps",
    "what to do",
    "suggestion",
];

/// Extract the header text if this line is a header, honoring the length cap.
fn header_text(line: &str, header_max_chars: usize) -> Option<String> {
    let trimmed = line.trim();
    let captured = MD_HEADING
        .captures(trimmed)
        .or_else(|| BOLD_HEADING.captures(trimmed))
        .map(|c| c[1].to_string())?;

    if captured.chars().count() > header_max_chars {
        return None;
    }
    Some(captured)
}

/// Split text into header-delimited sections.
///
/// Text before the first header is not a detected section and is ignored
/// for section counting.
pub fn split_sections(text: &str, header_max_chars: usize) -> Vec<(String, String)> {
    let mut sections: Vec<(String, String)> = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in text.lines() {
        if let Some(header) = header_text(line, header_max_chars) {
            if let Some((h, body)) = current.take() {
                sections.push((h, body.join("\n")));
            }
            current = Some((header, Vec::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }

    if let Some((h, body)) = current {
        sections.push((h, body.join("\n")));
    }

    sections
}

/// Classify a section by its header.
///
/// Card-name and position-label matches outrank generic keyword cues.
pub fn classify_section(header: &str, drawn: &[DrawnCard], spread: &Spread) -> Classification {
    let lower = header.to_lowercase();

    for dc in drawn {
        if dc
            .card
            .known_names()
            .any(|n| lower.contains(&n.to_lowercase()))
        {
            return Classification {
                kind: SectionKind::Card,
                confidence: 0.95,
            };
        }
    }

    for position in &spread.positions {
        if lower.contains(&position.label.to_lowercase()) {
            return Classification {
                kind: SectionKind::Card,
                confidence: 0.9,
            };
        }
    }

    for cue in OPENING_CUES {
        if lower.contains(cue) {
            return Classification {
                kind: SectionKind::Opening,
                confidence: 0.85,
            };
        }
    }
    for cue in CLOSING_CUES {
        if lower.contains(cue) {
            return Classification {
                kind: SectionKind::Closing,
                confidence: 0.85,
            };
        }
    }
    for cue in ACTION_CUES {
        if lower.contains(cue) {
            return Classification {
                kind: SectionKind::Action,
                confidence: 0.85,
            };
        }
    }

    if lower.contains("card") || lower.contains("position") {
        return Classification {
            kind: SectionKind::Card,
            confidence: 0.6,
        };
    }

    Classification {
        kind: SectionKind::Unknown,
        confidence: 0.2,
    }
}

/// Split and classify in one pass.
pub fn detect_sections(
    text: &str,
    drawn: &[DrawnCard],
    spread: &Spread,
    header_max_chars: usize,
) -> Vec<Section> {
    split_sections(text, header_max_chars)
        .into_iter()
        .map(|(header, body)| {
            let classification = classify_section(&header, drawn, spread);
            Section {
                header,
                body,
                kind: classification.kind,
                confidence: classification.confidence,
            }
        })
        .collect()
}
