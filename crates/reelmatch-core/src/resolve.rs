//! Candidate resolution: pick the search result that is the catalog film.
//!
//! Every candidate is scored; the best year-compatible one is accepted only
//! if it clears the threshold. Scanning the whole list matters because
//! sources often rank a remake, a sequel, or a same-named series above the
//! film we want.

use serde::Serialize;
use tracing::debug;

use crate::config::MatchConfig;
use crate::model::{Candidate, CanonicalEntity, MatchResult};
use crate::similarity;
use crate::CoreError;

/// Scoring detail for one eligible candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    /// Position in the input list.
    pub index: usize,
    /// Title score plus the year bonus, capped at 1.
    pub score: f64,
    pub year_diff: Option<u32>,
    pub year_compatible: bool,
}

/// Score every non-excluded candidate against `entity`, in input order.
///
/// Candidates of an excluded media kind are left out; candidates outside the
/// year tolerance are kept but flagged `year_compatible = false`.
pub fn score_candidates(
    entity: &CanonicalEntity,
    candidates: &[Candidate],
    config: &MatchConfig,
) -> Result<Vec<ScoredCandidate>, CoreError> {
    check_inputs(entity, config)?;
    Ok(score_all(entity, candidates, config))
}

/// Resolve `entity` against a source's search results.
///
/// Returns a match only when the best year-compatible candidate scores at
/// least `config.threshold`. Equal scores prefer the smaller year gap
/// (unknown gaps rank last), then the earlier candidate. An empty list, or
/// no candidate clearing the threshold, is a not-found result, not an error.
pub fn resolve(
    entity: &CanonicalEntity,
    candidates: &[Candidate],
    config: &MatchConfig,
) -> Result<MatchResult, CoreError> {
    check_inputs(entity, config)?;
    if candidates.is_empty() {
        return Ok(MatchResult::not_found());
    }

    let mut best: Option<ScoredCandidate> = None;
    for scored in score_all(entity, candidates, config) {
        if !scored.year_compatible {
            continue;
        }
        let better = match &best {
            None => true,
            Some(current) => {
                scored.score > current.score
                    || (scored.score == current.score
                        && diff_rank(scored.year_diff) < diff_rank(current.year_diff))
            }
        };
        if better {
            best = Some(scored);
        }
    }

    let Some(best) = best else {
        debug!(title = %entity.title, "no eligible candidate");
        return Ok(MatchResult::not_found());
    };

    if best.score < config.threshold {
        debug!(
            title = %entity.title,
            best_score = best.score,
            threshold = config.threshold,
            "best candidate below threshold"
        );
        return Ok(MatchResult {
            candidate: None,
            score: best.score,
            year_compatible: true,
            year_diff: best.year_diff,
        });
    }

    let chosen = candidates[best.index].clone();
    debug!(
        title = %entity.title,
        matched = %chosen.raw_title,
        external_ref = %chosen.external_ref,
        score = best.score,
        "resolved candidate"
    );
    Ok(MatchResult {
        candidate: Some(chosen),
        score: best.score,
        year_compatible: true,
        year_diff: best.year_diff,
    })
}

fn check_inputs(entity: &CanonicalEntity, config: &MatchConfig) -> Result<(), CoreError> {
    if entity.title.trim().is_empty() {
        return Err(CoreError::MissingTitle);
    }
    config.validate()
}

fn score_all(
    entity: &CanonicalEntity,
    candidates: &[Candidate],
    config: &MatchConfig,
) -> Vec<ScoredCandidate> {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.media_kind.is_excluded())
        .map(|(index, candidate)| {
            let title_score = similarity::score(&entity.title, &candidate.raw_title);
            let year_diff = match (entity.release_year, candidate.raw_year) {
                (Some(a), Some(b)) => Some(a.abs_diff(b)),
                _ => None,
            };
            let (score, year_compatible) = match year_diff {
                Some(diff) if diff <= config.year_tolerance => {
                    ((title_score + config.year_bonus).min(1.0), true)
                }
                Some(_) => (title_score, false),
                None => (title_score, true),
            };
            debug!(
                candidate = %candidate.raw_title,
                index,
                score,
                ?year_diff,
                year_compatible,
                "scored candidate"
            );
            ScoredCandidate {
                index,
                score,
                year_diff,
                year_compatible,
            }
        })
        .collect()
}

/// Known gaps sort by size; an unknown gap ranks after every known one.
fn diff_rank(diff: Option<u32>) -> u64 {
    diff.map_or(u64::MAX, u64::from)
}
