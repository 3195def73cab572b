//! Snapshot-backed sources: search results and ratings captured from live
//! sources into a JSON file, replayed through the [`RatingSource`] seam.
//!
//! ```json
//! {
//!   "captured_at": "2025-11-20T12:00:00Z",
//!   "sources": {
//!     "imdb": {
//!       "searches": { "The Ritual": [{ "raw_title": "The Ritual", "raw_year": 2017, "external_ref": "tt5638642" }] },
//!       "ratings": { "tt5638642": { "value": 6.3, "vote_weight": 105000 } }
//!     }
//!   }
//! }
//! ```
//!
//! Search keys are normalised on load, so `"The Ritual"` and
//! `"ritual (2017)"` address the same entry. A rating without its own
//! `observed_at` inherits the snapshot's `captured_at`.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reelmatch_core::{Candidate, FreshObservation, normalize};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{RatingSource, SourceError};

/// A captured rating as stored in the snapshot file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub value: f64,
    #[serde(default)]
    pub vote_weight: Option<u64>,
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,
}

/// Everything captured from one source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceSnapshot {
    #[serde(default)]
    pub searches: BTreeMap<String, Vec<Candidate>>,
    #[serde(default)]
    pub ratings: BTreeMap<String, RatingRecord>,
}

/// A snapshot file: per-source captures plus the capture time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceSnapshot>,
}

impl Snapshot {
    pub fn from_json(json: &str) -> Result<Self, SourceError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a snapshot file.
    pub async fn load(path: &Path) -> Result<Self, SourceError> {
        let bytes = tokio::fs::read(path).await?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        info!(
            path = %path.display(),
            sources = snapshot.sources.len(),
            "loaded snapshot"
        );
        Ok(snapshot)
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(|k| k.as_str())
    }

    /// Adapter for one named source, if the snapshot has it.
    pub fn source(&self, name: &str) -> Option<SnapshotSource> {
        self.sources
            .get(name)
            .map(|s| SnapshotSource::new(name, s.clone(), self.captured_at))
    }

    /// One adapter per captured source, in name order.
    pub fn into_sources(self) -> Vec<SnapshotSource> {
        let captured_at = self.captured_at;
        self.sources
            .into_iter()
            .map(|(name, s)| SnapshotSource::new(&name, s, captured_at))
            .collect()
    }
}

/// [`RatingSource`] replaying one source's captured searches and ratings.
pub struct SnapshotSource {
    name: String,
    searches: HashMap<String, Vec<Candidate>>,
    ratings: HashMap<String, RatingRecord>,
    captured_at: Option<DateTime<Utc>>,
}

impl SnapshotSource {
    pub fn new(name: &str, snapshot: SourceSnapshot, captured_at: Option<DateTime<Utc>>) -> Self {
        let mut searches: HashMap<String, Vec<Candidate>> = HashMap::new();
        for (query, candidates) in snapshot.searches {
            searches
                .entry(normalize(&query))
                .or_default()
                .extend(candidates);
        }
        Self {
            name: name.to_string(),
            searches,
            ratings: snapshot.ratings.into_iter().collect(),
            captured_at,
        }
    }
}

#[async_trait]
impl RatingSource for SnapshotSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, title: &str, year: Option<i32>) -> Result<Vec<Candidate>, SourceError> {
        let key = normalize(title);
        let results = self.searches.get(&key).cloned().unwrap_or_default();
        debug!(source = %self.name, query = %key, ?year, count = results.len(), "snapshot search");
        Ok(results)
    }

    async fn fetch_rating(
        &self,
        external_ref: &str,
    ) -> Result<Option<FreshObservation>, SourceError> {
        let Some(record) = self.ratings.get(external_ref) else {
            return Ok(None);
        };
        let observed_at = record.observed_at.or(self.captured_at).ok_or_else(|| {
            SourceError::MissingTimestamp {
                external_ref: external_ref.to_string(),
            }
        })?;
        Ok(Some(FreshObservation {
            source: self.name.clone(),
            value: record.value,
            vote_weight: record.vote_weight,
            observed_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SNAPSHOT: &str = r#"{
        "captured_at": "2025-11-20T12:00:00Z",
        "sources": {
            "imdb": {
                "searches": {
                    "The Ritual": [
                        {"raw_title": "The Ritual", "raw_year": 2017, "external_ref": "tt5638642"},
                        {"raw_title": "Ritual of Death", "raw_year": 2001, "external_ref": "tt0290001"}
                    ]
                },
                "ratings": {
                    "tt5638642": {"value": 6.3, "vote_weight": 105000},
                    "tt0290001": {"value": 3.1, "observed_at": "2025-01-02T00:00:00Z"}
                }
            },
            "rotten_tomatoes": {
                "searches": {
                    "Devotion": [
                        {"raw_title": "Devotion", "raw_year": 2022, "external_ref": "devotion_2022"},
                        {"raw_title": "Devotion", "external_ref": "/tv/devotion", "media_kind": "series"}
                    ]
                }
            }
        }
    }"#;

    fn captured_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 20, 12, 0, 0).unwrap()
    }

    #[test]
    fn parses_sources_in_name_order() {
        let snapshot = Snapshot::from_json(SNAPSHOT).unwrap();
        let names: Vec<&str> = snapshot.source_names().collect();
        assert_eq!(names, vec!["imdb", "rotten_tomatoes"]);
        assert_eq!(snapshot.captured_at, Some(captured_at()));
    }

    #[tokio::test]
    async fn search_uses_normalised_key() {
        let source = Snapshot::from_json(SNAPSHOT).unwrap().source("imdb").unwrap();
        let results = source.search("the ritual (2017)", Some(2017)).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].external_ref, "tt5638642");
    }

    #[tokio::test]
    async fn unknown_search_is_empty() {
        let source = Snapshot::from_json(SNAPSHOT).unwrap().source("imdb").unwrap();
        assert!(source.search("Poor Things", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rating_inherits_capture_time() {
        let source = Snapshot::from_json(SNAPSHOT).unwrap().source("imdb").unwrap();
        let obs = source.fetch_rating("tt5638642").await.unwrap().unwrap();
        assert_eq!(obs.source, "imdb");
        assert_eq!(obs.value, 6.3);
        assert_eq!(obs.vote_weight, Some(105_000));
        assert_eq!(obs.observed_at, captured_at());
    }

    #[tokio::test]
    async fn rating_keeps_own_timestamp() {
        let source = Snapshot::from_json(SNAPSHOT).unwrap().source("imdb").unwrap();
        let obs = source.fetch_rating("tt0290001").await.unwrap().unwrap();
        assert_eq!(obs.observed_at, Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn missing_rating_is_none() {
        let source = Snapshot::from_json(SNAPSHOT).unwrap().source("rotten_tomatoes").unwrap();
        assert!(source.fetch_rating("devotion_2022").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn undated_rating_without_capture_time_is_an_error() {
        let json = r#"{"sources": {"imdb": {"ratings": {"tt1": {"value": 5.0}}}}}"#;
        let source = Snapshot::from_json(json).unwrap().source("imdb").unwrap();
        let err = source.fetch_rating("tt1").await.unwrap_err();
        assert!(matches!(err, SourceError::MissingTimestamp { .. }));
    }

    #[tokio::test]
    async fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, SNAPSHOT).unwrap();

        let sources = Snapshot::load(&path).await.unwrap().into_sources();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[1].name(), "rotten_tomatoes");
        let results = sources[1].search("Devotion", Some(2022)).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn load_missing_file_is_io_error() {
        let err = Snapshot::load(Path::new("/nonexistent/snapshot.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Io(_)));
    }

    #[test]
    fn malformed_json_is_json_error() {
        assert!(matches!(
            Snapshot::from_json("{not json").unwrap_err(),
            SourceError::Json(_)
        ));
    }
}
