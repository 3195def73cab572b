//! Reconciliation pipeline: search every source, resolve, fetch, fuse.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::future::join_all;
use reelmatch_core::{
    CanonicalEntity, CoreError, FreshObservation, FusedScore, FusionConfig, MatchConfig,
    MatchResult, fuse, resolve,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::{RatingSource, SourceError};

/// What happened with one source for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Resolved and a rating was fetched.
    Matched,
    /// No candidate cleared the threshold.
    NotFound,
    /// Resolved, but the source has no rating for the match.
    NoRating,
    /// Search or fetch failed, or the fetched rating was off the scale.
    Failed,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::NotFound => "not_found",
            Self::NoRating => "no_rating",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceOutcome {
    pub source: String,
    pub status: SourceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_result: Option<MatchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<FreshObservation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceOutcome {
    fn failed(source: &str, error: &SourceError) -> Self {
        Self {
            source: source.to_string(),
            status: SourceStatus::Failed,
            match_result: None,
            observation: None,
            error: Some(error.to_string()),
        }
    }
}

/// Everything learned about one catalog entity.
#[derive(Debug, Clone, Serialize)]
pub struct EntityReport {
    pub entity: CanonicalEntity,
    pub outcomes: Vec<SourceOutcome>,
    pub fused: FusedScore,
}

/// A catalog entity that could not be reconciled at all.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedEntity {
    pub label: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogSummary {
    pub entities: usize,
    pub rejected: usize,
    pub anomalies: usize,
    /// source name → entities matched with a rating.
    pub matched_by_source: BTreeMap<String, usize>,
    /// source name → failed calls.
    pub failed_by_source: BTreeMap<String, usize>,
    /// strategy → entities fused with it.
    pub strategies: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogReport {
    pub reports: Vec<EntityReport>,
    pub rejected: Vec<RejectedEntity>,
    pub summary: CatalogSummary,
}

/// Runs catalog entities through every configured source.
pub struct Reconciler {
    sources: Vec<Box<dyn RatingSource>>,
    match_config: MatchConfig,
    fusion_config: FusionConfig,
    concurrency: usize,
}

impl Reconciler {
    pub fn new(match_config: MatchConfig, fusion_config: FusionConfig) -> Self {
        Self {
            sources: Vec::new(),
            match_config,
            fusion_config,
            concurrency: 4,
        }
    }

    pub fn with_source(mut self, source: impl RatingSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn add_source(&mut self, source: Box<dyn RatingSource>) {
        self.sources.push(source);
    }

    /// Maximum number of entities in flight at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Reconcile one entity as of `now`.
    ///
    /// Source failures are recorded in the report, not returned. Only an
    /// invalid entity (no title, baseline off the rating scale) or invalid
    /// config is an error, and it is raised before any source is called.
    pub async fn reconcile_entity(
        &self,
        entity: &CanonicalEntity,
        now: DateTime<Utc>,
    ) -> Result<EntityReport, SourceError> {
        if entity.title.trim().is_empty() {
            return Err(CoreError::MissingTitle.into());
        }
        self.match_config.validate()?;
        self.fusion_config.validate()?;
        self.fusion_config
            .scale
            .check("baseline_score", entity.baseline_score)?;

        let outcomes: Vec<SourceOutcome> = join_all(
            self.sources
                .iter()
                .map(|source| self.query_source(source.as_ref(), entity)),
        )
        .await
        .into_iter()
        .collect::<Result<_, _>>()?;

        let observations: Vec<FreshObservation> = outcomes
            .iter()
            .filter_map(|o| o.observation.clone())
            .collect();
        let fused = fuse(&entity.baseline(), &observations, now, &self.fusion_config)?;

        if fused.anomaly {
            warn!(
                entity = entity.label(),
                baseline = entity.baseline_score,
                fused = fused.value,
                divergence = fused.divergence,
                "rating divergence above threshold"
            );
        }
        info!(
            entity = entity.label(),
            sources = outcomes.len(),
            observations = observations.len(),
            strategy = fused.chosen_strategy.as_str(),
            value = fused.value,
            "reconciled"
        );

        Ok(EntityReport {
            entity: entity.clone(),
            outcomes,
            fused,
        })
    }

    /// Reconcile a whole catalog, up to `concurrency` entities at a time.
    ///
    /// Reports come back in catalog order. Invalid entities are listed in
    /// `rejected` and do not stop the run.
    pub async fn reconcile_catalog(
        &self,
        entities: &[CanonicalEntity],
        now: DateTime<Utc>,
    ) -> CatalogReport {
        let results: Vec<(&CanonicalEntity, Result<EntityReport, SourceError>)> =
            futures::stream::iter(entities)
                .map(|entity| async move { (entity, self.reconcile_entity(entity, now).await) })
                .buffered(self.concurrency)
                .collect()
                .await;

        let mut reports = Vec::with_capacity(results.len());
        let mut rejected = Vec::new();
        let mut summary = CatalogSummary {
            entities: entities.len(),
            ..Default::default()
        };

        for (entity, result) in results {
            match result {
                Ok(report) => {
                    summary.add(&report);
                    reports.push(report);
                }
                Err(e) => {
                    warn!(entity = entity.label(), error = %e, "entity rejected");
                    rejected.push(RejectedEntity {
                        label: entity.label().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        summary.rejected = rejected.len();

        info!(
            entities = summary.entities,
            rejected = summary.rejected,
            anomalies = summary.anomalies,
            "catalog reconciled"
        );
        CatalogReport {
            reports,
            rejected,
            summary,
        }
    }

    /// Search, resolve, and fetch for one source. Only core input errors
    /// propagate; source errors and off-scale ratings become a `Failed`
    /// outcome, so the other sources still fuse.
    async fn query_source(
        &self,
        source: &dyn RatingSource,
        entity: &CanonicalEntity,
    ) -> Result<SourceOutcome, SourceError> {
        let name = source.name();
        let candidates = match source.search(&entity.title, entity.release_year).await {
            Ok(c) => c,
            Err(e) => {
                warn!(source = name, entity = entity.label(), error = %e, "search failed");
                return Ok(SourceOutcome::failed(name, &e));
            }
        };

        let matched = resolve(entity, &candidates, &self.match_config)?;
        let Some(external_ref) = matched.external_ref().map(str::to_string) else {
            return Ok(SourceOutcome {
                source: name.to_string(),
                status: SourceStatus::NotFound,
                match_result: Some(matched),
                observation: None,
                error: None,
            });
        };

        match source.fetch_rating(&external_ref).await {
            Ok(Some(mut obs)) => {
                if obs.source.is_empty() {
                    obs.source = name.to_string();
                }
                if let Err(e) = self.fusion_config.scale.check("observation value", obs.value) {
                    warn!(source = name, external_ref = %external_ref, value = obs.value, "rating off scale");
                    return Ok(SourceOutcome {
                        source: name.to_string(),
                        status: SourceStatus::Failed,
                        match_result: Some(matched),
                        observation: None,
                        error: Some(e.to_string()),
                    });
                }
                Ok(SourceOutcome {
                    source: name.to_string(),
                    status: SourceStatus::Matched,
                    match_result: Some(matched),
                    observation: Some(obs),
                    error: None,
                })
            }
            Ok(None) => Ok(SourceOutcome {
                source: name.to_string(),
                status: SourceStatus::NoRating,
                match_result: Some(matched),
                observation: None,
                error: None,
            }),
            Err(SourceError::Core(e)) => Err(e.into()),
            Err(e) => {
                warn!(source = name, external_ref = %external_ref, error = %e, "rating fetch failed");
                Ok(SourceOutcome {
                    source: name.to_string(),
                    status: SourceStatus::Failed,
                    match_result: Some(matched),
                    observation: None,
                    error: Some(e.to_string()),
                })
            }
        }
    }
}

impl CatalogSummary {
    fn add(&mut self, report: &EntityReport) {
        if report.fused.anomaly {
            self.anomalies += 1;
        }
        *self
            .strategies
            .entry(report.fused.chosen_strategy.as_str().to_string())
            .or_default() += 1;
        for outcome in &report.outcomes {
            match outcome.status {
                SourceStatus::Matched => {
                    *self.matched_by_source.entry(outcome.source.clone()).or_default() += 1;
                }
                SourceStatus::Failed => {
                    *self.failed_by_source.entry(outcome.source.clone()).or_default() += 1;
                }
                SourceStatus::NotFound | SourceStatus::NoRating => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Snapshot;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use reelmatch_core::{Candidate, FusionStrategy};

    const SNAPSHOT: &str = r#"{
        "captured_at": "2025-11-20T12:00:00Z",
        "sources": {
            "imdb": {
                "searches": {
                    "The Ritual": [
                        {"raw_title": "The Ritual", "raw_year": 2017, "external_ref": "tt5638642"},
                        {"raw_title": "Ritual of Death", "raw_year": 2001, "external_ref": "tt0290001"}
                    ],
                    "Poor Things": [
                        {"raw_title": "Poor Things", "raw_year": 2023, "external_ref": "tt14230458"}
                    ]
                },
                "ratings": {
                    "tt5638642": {"value": 6.3, "vote_weight": 105000},
                    "tt14230458": {"value": 7.8, "vote_weight": 300000}
                }
            },
            "rotten_tomatoes": {
                "searches": {
                    "The Ritual": [
                        {"raw_title": "The Ritual", "raw_year": 2017, "external_ref": "the_ritual_2017"}
                    ],
                    "Poor Things": [
                        {"raw_title": "Poor Things", "external_ref": "/tv/poor_things", "media_kind": "series"}
                    ]
                },
                "ratings": {
                    "the_ritual_2017": {"value": 6.9, "vote_weight": 2500}
                }
            }
        }
    }"#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 21, 0, 0, 0).unwrap()
    }

    fn reconciler() -> Reconciler {
        let mut r = Reconciler::new(MatchConfig::default(), FusionConfig::default());
        for source in Snapshot::from_json(SNAPSHOT).unwrap().into_sources() {
            r.add_source(Box::new(source));
        }
        r
    }

    struct Down;

    #[async_trait]
    impl RatingSource for Down {
        fn name(&self) -> &str {
            "down"
        }

        async fn search(&self, _: &str, _: Option<i32>) -> Result<Vec<Candidate>, SourceError> {
            Err(SourceError::Unavailable("down".into()))
        }

        async fn fetch_rating(&self, _: &str) -> Result<Option<FreshObservation>, SourceError> {
            Err(SourceError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn both_sources_match_and_average() {
        let entity = CanonicalEntity::new("The Ritual", 6.3).with_year(2017).with_votes(100_000);
        let report = reconciler().reconcile_entity(&entity, now()).await.unwrap();

        assert_eq!(report.outcomes.len(), 2);
        assert!(report.outcomes.iter().all(|o| o.status == SourceStatus::Matched));
        assert_eq!(
            report.outcomes[0].match_result.as_ref().unwrap().external_ref(),
            Some("tt5638642")
        );

        // The undated baseline is superseded by imdb, then rotten_tomatoes averages in.
        assert_eq!(report.fused.chosen_strategy, FusionStrategy::WeightedAverage);
        let expected = (6.3 * 105_000.0 + 6.9 * 2_500.0) / 107_500.0;
        assert!((report.fused.value - expected).abs() < 1e-9);
        assert!(!report.fused.anomaly);
    }

    #[tokio::test]
    async fn excluded_kind_yields_not_found() {
        let entity = CanonicalEntity::new("Poor Things", 8.0).with_year(2023);
        let report = reconciler().reconcile_entity(&entity, now()).await.unwrap();
        let rt = &report.outcomes[1];
        assert_eq!(rt.source, "rotten_tomatoes");
        assert_eq!(rt.status, SourceStatus::NotFound);
        assert_eq!(report.fused.chosen_strategy, FusionStrategy::SingleFresh);
        assert_eq!(report.fused.value, 7.8);
    }

    #[tokio::test]
    async fn unknown_title_falls_back_to_baseline() {
        let entity = CanonicalEntity::new("Space Sweepers", 6.5);
        let report = reconciler().reconcile_entity(&entity, now()).await.unwrap();
        assert!(report.outcomes.iter().all(|o| o.status == SourceStatus::NotFound));
        assert_eq!(report.fused.chosen_strategy, FusionStrategy::FallbackBaseline);
        assert_eq!(report.fused.value, 6.5);
    }

    #[tokio::test]
    async fn failing_source_is_recorded_not_fatal() {
        let r = reconciler().with_source(Down);
        let entity = CanonicalEntity::new("Poor Things", 8.0).with_year(2023);
        let report = r.reconcile_entity(&entity, now()).await.unwrap();
        let down = report.outcomes.iter().find(|o| o.source == "down").unwrap();
        assert_eq!(down.status, SourceStatus::Failed);
        assert!(down.error.as_deref().unwrap().contains("unavailable"));
        assert_eq!(report.fused.value, 7.8);
    }

    /// Reports a 0-100 percentage for every title.
    struct Percent;

    #[async_trait]
    impl RatingSource for Percent {
        fn name(&self) -> &str {
            "percent"
        }

        async fn search(&self, title: &str, year: Option<i32>) -> Result<Vec<Candidate>, SourceError> {
            Ok(vec![Candidate::film(title, year, "pct")])
        }

        async fn fetch_rating(&self, _: &str) -> Result<Option<FreshObservation>, SourceError> {
            Ok(Some(FreshObservation::new("percent", 79.0, now())))
        }
    }

    #[tokio::test]
    async fn off_scale_rating_fails_only_its_source() {
        let r = reconciler().with_source(Percent);
        let entities = vec![CanonicalEntity::new("Poor Things", 8.0).with_year(2023)];
        let report = r.reconcile_catalog(&entities, now()).await;

        assert!(report.rejected.is_empty());
        assert_eq!(report.reports.len(), 1);
        let entity_report = &report.reports[0];
        let pct = entity_report
            .outcomes
            .iter()
            .find(|o| o.source == "percent")
            .unwrap();
        assert_eq!(pct.status, SourceStatus::Failed);
        assert!(pct.observation.is_none());
        assert!(pct.match_result.as_ref().unwrap().is_match());
        assert!(pct.error.as_deref().unwrap().contains("outside the rating scale"));

        // imdb's 7.8 still fuses; 79 is neither used nor clamped.
        assert_eq!(entity_report.fused.value, 7.8);
        assert_eq!(entity_report.fused.provenance.len(), 2);
        assert_eq!(report.summary.failed_by_source["percent"], 1);
    }

    #[tokio::test]
    async fn invalid_entity_is_rejected_before_searching() {
        let entity = CanonicalEntity::new("", 6.0);
        let err = reconciler().reconcile_entity(&entity, now()).await.unwrap_err();
        assert!(matches!(err, SourceError::Core(CoreError::MissingTitle)));

        let off_scale = CanonicalEntity::new("The Ritual", 63.0);
        let err = reconciler().reconcile_entity(&off_scale, now()).await.unwrap_err();
        assert!(matches!(err, SourceError::Core(CoreError::OutOfScale { .. })));
    }

    #[tokio::test]
    async fn catalog_keeps_order_and_summarises() {
        let entities = vec![
            CanonicalEntity::new("The Ritual", 6.3).with_id("m1").with_year(2017),
            CanonicalEntity::new("", 5.0).with_id("m2"),
            CanonicalEntity::new("Poor Things", 6.0).with_id("m3").with_year(2023),
            CanonicalEntity::new("Space Sweepers", 6.5).with_id("m4"),
        ];
        let report = reconciler()
            .with_concurrency(2)
            .reconcile_catalog(&entities, now())
            .await;

        let labels: Vec<&str> = report.reports.iter().map(|r| r.entity.label()).collect();
        assert_eq!(labels, vec!["m1", "m3", "m4"]);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].label, "m2");

        let summary = &report.summary;
        assert_eq!(summary.entities, 4);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.matched_by_source["imdb"], 2);
        assert_eq!(summary.matched_by_source["rotten_tomatoes"], 1);
        // Poor Things: baseline 6.0 vs imdb 7.8.
        assert_eq!(summary.anomalies, 1);
        assert_eq!(summary.strategies["fallback-baseline"], 1);
    }
}
