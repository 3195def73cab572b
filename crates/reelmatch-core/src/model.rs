//! Shared record types passed between catalog loading, source adapters,
//! the resolver, and the fusion engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of title a search result denotes.
///
/// Only films are eligible for matching; series and anything else a source
/// mixes into its results are skipped by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Film,
    Series,
    Other,
}

impl MediaKind {
    pub fn is_excluded(self) -> bool {
        !matches!(self, Self::Film)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Film => "film",
            Self::Series => "series",
            Self::Other => "other",
        }
    }
}

/// A movie from the static catalog, the anchor that live records are matched against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEntity {
    /// Catalog key, if the catalog has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub release_year: Option<i32>,
    pub baseline_score: f64,
    /// How many opinions back `baseline_score`.
    #[serde(default)]
    pub baseline_vote_weight: Option<u64>,
    #[serde(default)]
    pub baseline_observed_at: Option<DateTime<Utc>>,
}

impl CanonicalEntity {
    pub fn new(title: impl Into<String>, baseline_score: f64) -> Self {
        Self {
            id: None,
            title: title.into(),
            release_year: None,
            baseline_score,
            baseline_vote_weight: None,
            baseline_observed_at: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.release_year = Some(year);
        self
    }

    pub fn with_votes(mut self, votes: u64) -> Self {
        self.baseline_vote_weight = Some(votes);
        self
    }

    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.baseline_observed_at = Some(at);
        self
    }

    /// The baseline rating fields, in the shape the fusion engine takes.
    pub fn baseline(&self) -> Baseline {
        Baseline {
            value: self.baseline_score,
            vote_weight: self.baseline_vote_weight,
            observed_at: self.baseline_observed_at,
        }
    }

    /// Display label: `id` when present, otherwise the title.
    pub fn label(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.title)
    }
}

/// Baseline rating of a catalog entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub value: f64,
    pub vote_weight: Option<u64>,
    /// `None` when the catalog does not record when the score was taken.
    pub observed_at: Option<DateTime<Utc>>,
}

/// One unverified search result from a live source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub raw_title: String,
    #[serde(default)]
    pub raw_year: Option<i32>,
    /// Source-specific handle (IMDb id, Rotten Tomatoes slug, URL).
    pub external_ref: String,
    #[serde(default)]
    pub media_kind: MediaKind,
}

impl Candidate {
    pub fn film(raw_title: impl Into<String>, raw_year: Option<i32>, external_ref: impl Into<String>) -> Self {
        Self {
            raw_title: raw_title.into(),
            raw_year,
            external_ref: external_ref.into(),
            media_kind: MediaKind::Film,
        }
    }

    pub fn with_kind(mut self, kind: MediaKind) -> Self {
        self.media_kind = kind;
        self
    }
}

/// Outcome of resolving one entity against one candidate list.
///
/// When `candidate` is `Some`, `score` is at least the acceptance threshold
/// and `year_compatible` is true. When it is `None`, `score` is the best
/// sub-threshold score seen (0 if nothing was eligible).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub candidate: Option<Candidate>,
    pub score: f64,
    pub year_compatible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_diff: Option<u32>,
}

impl MatchResult {
    pub fn not_found() -> Self {
        Self {
            candidate: None,
            score: 0.0,
            year_compatible: false,
            year_diff: None,
        }
    }

    pub fn is_match(&self) -> bool {
        self.candidate.is_some()
    }

    pub fn external_ref(&self) -> Option<&str> {
        self.candidate.as_ref().map(|c| c.external_ref.as_str())
    }
}

/// A live rating fetched for a matched candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreshObservation {
    /// Name of the source that produced the rating.
    #[serde(default)]
    pub source: String,
    pub value: f64,
    #[serde(default)]
    pub vote_weight: Option<u64>,
    pub observed_at: DateTime<Utc>,
}

impl FreshObservation {
    pub fn new(source: impl Into<String>, value: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            source: source.into(),
            value,
            vote_weight: None,
            observed_at,
        }
    }

    pub fn with_votes(mut self, votes: u64) -> Self {
        self.vote_weight = Some(votes);
        self
    }
}

/// Which branch of the fusion policy produced the fused value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FusionStrategy {
    SingleFresh,
    WeightedAverage,
    FallbackBaseline,
}

impl FusionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleFresh => "single-fresh",
            Self::WeightedAverage => "weighted-average",
            Self::FallbackBaseline => "fallback-baseline",
        }
    }
}

/// One input to a fusion call and whether the fused value depends on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    /// `"baseline"` or the observation's source name.
    pub origin: String,
    pub value: f64,
    /// Vote weight after substituting 1 for zero/unknown.
    pub weight: u64,
    /// False when the input was superseded and only feeds the divergence signal.
    pub used: bool,
}

/// Reconciled rating for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedScore {
    pub value: f64,
    pub chosen_strategy: FusionStrategy,
    /// Largest |baseline − observation| across observations; 0 without observations.
    pub divergence: f64,
    pub anomaly: bool,
    pub provenance: Vec<Contribution>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_json_with_missing_optionals() {
        let json = r#"{"title": "The Ritual", "baseline_score": 6.3}"#;
        let entity: CanonicalEntity = serde_json::from_str(json).unwrap();
        assert_eq!(entity.title, "The Ritual");
        assert!(entity.release_year.is_none());
        assert!(entity.baseline_vote_weight.is_none());
        assert!(entity.baseline_observed_at.is_none());
        assert_eq!(entity.label(), "The Ritual");
    }

    #[test]
    fn candidate_kind_defaults_to_film() {
        let json = r#"{"raw_title": "Devotion", "raw_year": 2022, "external_ref": "tt7693316"}"#;
        let candidate: Candidate = serde_json::from_str(json).unwrap();
        assert_eq!(candidate.media_kind, MediaKind::Film);
        assert!(!candidate.media_kind.is_excluded());
    }

    #[test]
    fn series_kind_is_excluded() {
        let json = r#"{"raw_title": "Devotion", "external_ref": "/tv/devotion", "media_kind": "series"}"#;
        let candidate: Candidate = serde_json::from_str(json).unwrap();
        assert!(candidate.media_kind.is_excluded());
    }

    #[test]
    fn strategy_serializes_kebab_case() {
        let json = serde_json::to_string(&FusionStrategy::FallbackBaseline).unwrap();
        assert_eq!(json, "\"fallback-baseline\"");
        assert_eq!(FusionStrategy::WeightedAverage.as_str(), "weighted-average");
    }

    #[test]
    fn entity_baseline_copies_fields() {
        let entity = CanonicalEntity::new("Poor Things", 7.8)
            .with_year(2023)
            .with_votes(250_000);
        let baseline = entity.baseline();
        assert_eq!(baseline.value, 7.8);
        assert_eq!(baseline.vote_weight, Some(250_000));
        assert!(baseline.observed_at.is_none());
    }
}
