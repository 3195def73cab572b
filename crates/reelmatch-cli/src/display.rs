//! Vertical card display for reconciliation reports.
//!
//! One card per entity: the catalog baseline, one line per source with its
//! match and rating, then the fused score and its provenance.

use std::fmt::{self, Write};

use reelmatch_core::{FusedScore, MatchResult, ScoreBreakdown};
use reelmatch_sources::{CatalogSummary, EntityReport, RejectedEntity, SourceOutcome};

const MAX_LIST_ITEMS: usize = 10;

// ── Public API ──

/// Print one entity report as a card.
pub fn print_report_card(report: &EntityReport) -> anyhow::Result<()> {
    let mut out = String::new();
    write_report_card(&mut out, report)?;
    print!("{out}");
    Ok(())
}

pub fn print_summary(summary: &CatalogSummary, rejected: &[RejectedEntity]) -> anyhow::Result<()> {
    let mut out = String::new();
    write_summary(&mut out, summary, rejected)?;
    print!("{out}");
    Ok(())
}

pub fn print_breakdown(a: &str, b: &str, breakdown: &ScoreBreakdown) -> anyhow::Result<()> {
    let mut out = String::new();
    write_breakdown(&mut out, a, b, breakdown)?;
    print!("{out}");
    Ok(())
}

pub fn print_match(label: &str, source: &str, result: &MatchResult) -> anyhow::Result<()> {
    let mut out = String::new();
    writeln!(out, "{label} @ {source}")?;
    write_match(&mut out, result)?;
    println!("{out}");
    Ok(())
}

// ── Card rendering ──

fn write_report_card(out: &mut impl Write, report: &EntityReport) -> fmt::Result {
    let entity = &report.entity;
    writeln!(out, "=== {} ===", entity.label())?;
    if entity.id.is_some() {
        writeln!(out, "{}", entity.title)?;
    }
    writeln!(out)?;

    writeln!(out, "Baseline")?;
    field(out, "score", format!("{:.2}", entity.baseline_score))?;
    if let Some(year) = entity.release_year {
        field(out, "release_year", year)?;
    }
    if let Some(votes) = entity.baseline_vote_weight {
        field(out, "votes", votes)?;
    }
    if let Some(at) = entity.baseline_observed_at {
        field(out, "observed_at", at.format("%Y-%m-%d"))?;
    }
    writeln!(out)?;

    if !report.outcomes.is_empty() {
        writeln!(out, "Sources")?;
        for outcome in &report.outcomes {
            write_outcome(out, outcome)?;
        }
        writeln!(out)?;
    }

    write_fused(out, &report.fused)?;
    writeln!(out)
}

fn write_outcome(out: &mut impl Write, outcome: &SourceOutcome) -> fmt::Result {
    write!(out, "  {:<26} {}", outcome.source, outcome.status.as_str())?;
    if let Some(obs) = &outcome.observation {
        write!(out, "  {:.2}", obs.value)?;
        if let Some(votes) = obs.vote_weight {
            write!(out, " ({votes} votes)")?;
        }
        write!(out, "  {}", obs.observed_at.format("%Y-%m-%d"))?;
    }
    writeln!(out)?;

    if let Some(result) = &outcome.match_result {
        match &result.candidate {
            Some(c) => {
                write!(out, "      {} [{}]", c.raw_title, c.external_ref)?;
                if let Some(y) = c.raw_year {
                    write!(out, "  {y}")?;
                }
                writeln!(out, "  score {:.3}", result.score)?;
            }
            None if result.score > 0.0 => {
                writeln!(out, "      best sub-threshold score {:.3}", result.score)?;
            }
            None => {}
        }
    }
    if let Some(error) = &outcome.error {
        writeln!(out, "      error: {error}")?;
    }
    Ok(())
}

fn write_fused(out: &mut impl Write, fused: &FusedScore) -> fmt::Result {
    writeln!(out, "Fused")?;
    field(out, "value", format!("{:.2}", fused.value))?;
    field(out, "strategy", fused.chosen_strategy.as_str())?;
    field(out, "divergence", format!("{:.2}", fused.divergence))?;
    if fused.anomaly {
        field(out, "anomaly", "yes")?;
    }

    let len = fused.provenance.len();
    writeln!(out, "  provenance ({len}):")?;
    for c in fused.provenance.iter().take(MAX_LIST_ITEMS) {
        write!(out, "    {:<24}  {:.2}  weight {}", c.origin, c.value, c.weight)?;
        if !c.used {
            write!(out, "  (superseded)")?;
        }
        writeln!(out)?;
    }
    if len > MAX_LIST_ITEMS {
        writeln!(out, "    ... and {} more", len - MAX_LIST_ITEMS)?;
    }
    Ok(())
}

fn write_summary(
    out: &mut impl Write,
    summary: &CatalogSummary,
    rejected: &[RejectedEntity],
) -> fmt::Result {
    writeln!(out, "=== Summary ===")?;
    field(out, "entities", summary.entities)?;
    field(out, "rejected", summary.rejected)?;
    field(out, "anomalies", summary.anomalies)?;
    for (source, n) in &summary.matched_by_source {
        field(out, &format!("matched {source}"), n)?;
    }
    for (source, n) in &summary.failed_by_source {
        field(out, &format!("failed {source}"), n)?;
    }
    for (strategy, n) in &summary.strategies {
        field(out, strategy, n)?;
    }
    for r in rejected.iter().take(MAX_LIST_ITEMS) {
        writeln!(out, "  rejected {}: {}", r.label, r.reason)?;
    }
    if rejected.len() > MAX_LIST_ITEMS {
        writeln!(out, "  ... and {} more", rejected.len() - MAX_LIST_ITEMS)?;
    }
    Ok(())
}

fn write_breakdown(out: &mut impl Write, a: &str, b: &str, s: &ScoreBreakdown) -> fmt::Result {
    field(out, "normalized a", reelmatch_core::normalize(a))?;
    field(out, "normalized b", reelmatch_core::normalize(b))?;
    field(out, "exact", format!("{:.3}", s.exact))?;
    field(out, "containment", format!("{:.3}", s.containment))?;
    field(out, "sequence", format!("{:.3}", s.sequence))?;
    field(out, "token_overlap", format!("{:.3}", s.token_overlap))?;
    let (strategy, best) = s.best();
    field(out, "score", format!("{best:.3} ({})", strategy.as_str()))
}

fn write_match(out: &mut impl Write, result: &MatchResult) -> fmt::Result {
    match &result.candidate {
        Some(c) => {
            field(out, "match", &c.raw_title)?;
            field(out, "external_ref", &c.external_ref)?;
            if let Some(y) = c.raw_year {
                field(out, "year", y)?;
            }
        }
        None => field(out, "match", "(none)")?,
    }
    field(out, "score", format!("{:.3}", result.score))?;
    field(out, "year_compatible", if result.year_compatible { "yes" } else { "no" })?;
    if let Some(diff) = result.year_diff {
        field(out, "year_diff", diff)?;
    }
    Ok(())
}

// ── Helpers ──

fn field(out: &mut impl Write, name: &str, value: impl fmt::Display) -> fmt::Result {
    writeln!(out, "  {name:<26} {value}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use reelmatch_core::{
        Candidate, CanonicalEntity, Contribution, FreshObservation, FusionStrategy,
    };
    use reelmatch_sources::SourceStatus;

    fn report() -> EntityReport {
        let at = Utc.with_ymd_and_hms(2025, 11, 20, 12, 0, 0).unwrap();
        EntityReport {
            entity: CanonicalEntity::new("Poor Things", 6.0).with_id("m3").with_year(2023),
            outcomes: vec![
                SourceOutcome {
                    source: "imdb".into(),
                    status: SourceStatus::Matched,
                    match_result: Some(MatchResult {
                        candidate: Some(Candidate::film("Poor Things", Some(2023), "tt14230458")),
                        score: 1.0,
                        year_compatible: true,
                        year_diff: Some(0),
                    }),
                    observation: Some(FreshObservation::new("imdb", 7.8, at).with_votes(300_000)),
                    error: None,
                },
                SourceOutcome {
                    source: "down".into(),
                    status: SourceStatus::Failed,
                    match_result: None,
                    observation: None,
                    error: Some("down is unavailable".into()),
                },
            ],
            fused: FusedScore {
                value: 7.8,
                chosen_strategy: FusionStrategy::SingleFresh,
                divergence: 1.8,
                anomaly: true,
                provenance: vec![
                    Contribution {
                        origin: "baseline".into(),
                        value: 6.0,
                        weight: 1,
                        used: false,
                    },
                    Contribution {
                        origin: "imdb".into(),
                        value: 7.8,
                        weight: 300_000,
                        used: true,
                    },
                ],
            },
        }
    }

    #[test]
    fn card_has_all_sections() {
        let mut out = String::new();
        write_report_card(&mut out, &report()).unwrap();

        assert!(out.starts_with("=== m3 ===\nPoor Things\n"));
        assert!(out.contains("Baseline\n"));
        assert!(out.contains("tt14230458"));
        assert!(out.contains("7.80 (300000 votes)  2025-11-20"));
        assert!(out.contains("error: down is unavailable"));
        assert!(out.contains("single-fresh"));
        assert!(out.contains("anomaly"));
        assert!(out.contains("(superseded)"));
    }

    #[test]
    fn breakdown_reports_best_strategy() {
        let s = reelmatch_core::score_breakdown("The Ritual", "Ritual");
        let mut out = String::new();
        write_breakdown(&mut out, "The Ritual", "Ritual", &s).unwrap();
        assert!(out.contains("exact"));
        assert!(out.contains("1.000 (exact)"));
    }

    #[test]
    fn long_rejection_lists_are_truncated() {
        let rejected: Vec<RejectedEntity> = (0..12)
            .map(|i| RejectedEntity {
                label: format!("m{i}"),
                reason: "missing title".into(),
            })
            .collect();
        let summary = CatalogSummary {
            entities: 12,
            rejected: 12,
            ..Default::default()
        };
        let mut out = String::new();
        write_summary(&mut out, &summary, &rejected).unwrap();
        assert!(out.contains("... and 2 more"));
    }
}
