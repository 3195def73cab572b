//! Title similarity scoring.
//!
//! Four strategies run over the normalised titles and the strongest one
//! wins. They catch different kinds of variation:
//!
//! | Strategy | Catches |
//! |----------|---------|
//! | exact | identical after normalisation |
//! | containment | one title embedded in the other ("Ritual" / "The Ritual: Director's Cut") |
//! | sequence | a handful of character edits (plural, punctuation, typos) |
//! | token overlap | reordered or partly shared words (sequel numbering, subtitles) |
//!
//! The result is the maximum, never a blend: one strong signal is enough.

use std::collections::HashSet;

use serde::Serialize;

use crate::normalize::normalize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Exact,
    Containment,
    Sequence,
    TokenOverlap,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Containment => "containment",
            Self::Sequence => "sequence",
            Self::TokenOverlap => "token_overlap",
        }
    }
}

/// Every sub-score for one title pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub exact: f64,
    pub containment: f64,
    pub sequence: f64,
    pub token_overlap: f64,
}

impl ScoreBreakdown {
    const ZERO: Self = Self {
        exact: 0.0,
        containment: 0.0,
        sequence: 0.0,
        token_overlap: 0.0,
    };

    /// Strongest strategy and its score. Ties go to the earlier strategy in
    /// declaration order.
    pub fn best(&self) -> (Strategy, f64) {
        let mut best = (Strategy::Exact, self.exact);
        for candidate in [
            (Strategy::Containment, self.containment),
            (Strategy::Sequence, self.sequence),
            (Strategy::TokenOverlap, self.token_overlap),
        ] {
            if candidate.1 > best.1 {
                best = candidate;
            }
        }
        best
    }
}

/// Similarity of two raw titles in `[0, 1]`.
pub fn score(baseline_title: &str, candidate_title: &str) -> f64 {
    score_breakdown(baseline_title, candidate_title).best().1
}

/// Normalise both titles and compute all sub-scores.
pub fn score_breakdown(baseline_title: &str, candidate_title: &str) -> ScoreBreakdown {
    score_normalized(&normalize(baseline_title), &normalize(candidate_title))
}

/// Sub-scores for two already-normalised titles.
///
/// An empty title carries no evidence, so any pair involving one scores 0.
pub fn score_normalized(a: &str, b: &str) -> ScoreBreakdown {
    if a.is_empty() || b.is_empty() {
        return ScoreBreakdown::ZERO;
    }
    ScoreBreakdown {
        exact: if a == b { 1.0 } else { 0.0 },
        containment: containment(a, b),
        sequence: strsim::normalized_levenshtein(a, b),
        token_overlap: token_overlap(a, b),
    }
}

/// `len(shorter) / len(longer)` when one title contains the other, else 0.
fn containment(a: &str, b: &str) -> f64 {
    let (shorter, longer) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    if !longer.contains(shorter) {
        return 0.0;
    }
    shorter.chars().count() as f64 / longer.chars().count() as f64
}

/// Jaccard index of the whitespace-separated token sets.
fn token_overlap(a: &str, b: &str) -> f64 {
    let left: HashSet<&str> = a.split_whitespace().collect();
    let right: HashSet<&str> = b.split_whitespace().collect();
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}
