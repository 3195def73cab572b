//! Rating fusion: reconcile a catalog baseline with live observations.
//!
//! The baseline and each observation are folded pairwise, oldest
//! observation first. At each step the running rating and the next
//! observation are compared by age:
//!
//! 1. More than `age_gap_days` apart: the fresher one wins outright.
//! 2. Observation fresh, running rating not: the observation supersedes it.
//!    A running rating with no timestamp is never fresh.
//! 3. Otherwise they are comparably aged: vote-weighted average, with the
//!    weights accumulating so later sources corroborate earlier ones.
//!
//! Divergence from the baseline is computed for every observation whether
//! or not it ends up in the fused value; it is a monitoring signal only.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::FusionConfig;
use crate::model::{Baseline, Contribution, FreshObservation, FusedScore, FusionStrategy};
use crate::CoreError;

/// Absorbs float noise in `a - b` so a divergence that is exactly the
/// threshold on paper is still flagged.
const DIVERGENCE_EPSILON: f64 = 1e-9;

/// Fuse `baseline` with `observations` as of `now`.
///
/// Fails only on out-of-scale values or invalid config. Missing vote
/// weights count as 1, a missing baseline timestamp counts as not fresh.
pub fn fuse(
    baseline: &Baseline,
    observations: &[FreshObservation],
    now: DateTime<Utc>,
    config: &FusionConfig,
) -> Result<FusedScore, CoreError> {
    config.validate()?;
    config.scale.check("baseline_score", baseline.value)?;
    for obs in observations {
        config.scale.check("observation value", obs.value)?;
    }

    let mut running = Running {
        value: baseline.value,
        weight: effective_weight(baseline.vote_weight),
        observed_at: baseline.observed_at,
        strategy: FusionStrategy::FallbackBaseline,
    };
    let mut provenance = vec![Contribution {
        origin: "baseline".to_string(),
        value: baseline.value,
        weight: running.weight,
        used: true,
    }];

    let mut ordered: Vec<&FreshObservation> = observations.iter().collect();
    ordered.sort_by_key(|obs| obs.observed_at);

    for obs in ordered {
        let weight = effective_weight(obs.vote_weight);
        let step = decide(&running, obs, now, config);
        debug!(
            source = %obs.source,
            value = obs.value,
            weight,
            ?step,
            "fusion step"
        );

        let used = match step {
            Step::Keep => false,
            Step::Supersede => {
                for c in provenance.iter_mut() {
                    c.used = false;
                }
                running = Running {
                    value: obs.value,
                    weight,
                    observed_at: Some(obs.observed_at),
                    strategy: FusionStrategy::SingleFresh,
                };
                true
            }
            Step::Average => {
                let total = running.weight.saturating_add(weight);
                running.value = (running.value * running.weight as f64
                    + obs.value * weight as f64)
                    / total as f64;
                running.weight = total;
                running.observed_at = Some(match running.observed_at {
                    Some(t) => t.max(obs.observed_at),
                    None => obs.observed_at,
                });
                running.strategy = FusionStrategy::WeightedAverage;
                true
            }
        };
        provenance.push(Contribution {
            origin: obs.source.clone(),
            value: obs.value,
            weight,
            used,
        });
    }

    let divergence = observations
        .iter()
        .map(|obs| (baseline.value - obs.value).abs())
        .fold(0.0, f64::max);
    let anomaly = !observations.is_empty()
        && divergence + DIVERGENCE_EPSILON >= config.divergence_threshold;

    Ok(FusedScore {
        value: running.value,
        chosen_strategy: running.strategy,
        divergence,
        anomaly,
        provenance,
    })
}

struct Running {
    value: f64,
    weight: u64,
    observed_at: Option<DateTime<Utc>>,
    strategy: FusionStrategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Running rating is fresher by more than the age gap.
    Keep,
    /// Observation replaces the running rating.
    Supersede,
    /// Comparably aged: blend by weight.
    Average,
}

fn decide(
    running: &Running,
    obs: &FreshObservation,
    now: DateTime<Utc>,
    config: &FusionConfig,
) -> Step {
    let obs_fresh = is_fresh(obs.observed_at, now, config);
    match running.observed_at {
        Some(at) => {
            let gap = (obs.observed_at - at).abs();
            if gap > config.age_gap() {
                if obs.observed_at > at {
                    Step::Supersede
                } else {
                    Step::Keep
                }
            } else if obs_fresh && !is_fresh(at, now, config) {
                Step::Supersede
            } else {
                Step::Average
            }
        }
        None if obs_fresh => Step::Supersede,
        None => Step::Average,
    }
}

/// Within the freshness window of `now`. Timestamps in the future count as fresh.
fn is_fresh(at: DateTime<Utc>, now: DateTime<Utc>, config: &FusionConfig) -> bool {
    now - at <= config.freshness_window()
}

fn effective_weight(votes: Option<u64>) -> u64 {
    votes.filter(|&v| v > 0).unwrap_or(1)
}
