//! Tuning parameters for resolution and fusion.
//!
//! Every call takes its config explicitly; defaults match the values the
//! catalog pipeline runs with (±2 years, 1.0-point divergence).

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// The fixed numeric scale all ratings are expressed on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingScale {
    pub min: f64,
    pub max: f64,
}

impl Default for RatingScale {
    fn default() -> Self {
        Self { min: 0.0, max: 10.0 }
    }
}

impl RatingScale {
    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }

    /// Reject `value` unless it lies on the scale. Never clamps.
    pub fn check(&self, field: &'static str, value: f64) -> Result<(), CoreError> {
        if self.contains(value) {
            Ok(())
        } else {
            Err(CoreError::OutOfScale {
                field,
                value,
                min: self.min,
                max: self.max,
            })
        }
    }
}

/// Candidate resolution parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Minimum score a candidate needs to be accepted.
    pub threshold: f64,
    /// Largest release-year difference still treated as the same film.
    pub year_tolerance: u32,
    /// Added to the title score when both years are known and within tolerance.
    pub year_bonus: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            year_tolerance: 2,
            year_bonus: 0.1,
        }
    }
}

impl MatchConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(CoreError::InvalidConfig(format!(
                "threshold must be within 0..=1, got {}",
                self.threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.year_bonus) {
            return Err(CoreError::InvalidConfig(format!(
                "year_bonus must be within 0..=1, got {}",
                self.year_bonus
            )));
        }
        Ok(())
    }
}

/// Rating fusion parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// An observation at most this old counts as fresh.
    pub freshness_window_days: i64,
    /// Beyond this gap between two ratings the older one is ignored.
    pub age_gap_days: i64,
    /// Divergence at or above this flags an anomaly.
    pub divergence_threshold: f64,
    pub scale: RatingScale,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            freshness_window_days: 7,
            age_gap_days: 30,
            divergence_threshold: 1.0,
            scale: RatingScale::default(),
        }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        check_days("freshness_window_days", self.freshness_window_days)?;
        check_days("age_gap_days", self.age_gap_days)?;
        if !self.divergence_threshold.is_finite() || self.divergence_threshold < 0.0 {
            return Err(CoreError::InvalidConfig(format!(
                "divergence_threshold must be a non-negative number, got {}",
                self.divergence_threshold
            )));
        }
        if !(self.scale.min.is_finite() && self.scale.max.is_finite())
            || self.scale.min >= self.scale.max
        {
            return Err(CoreError::InvalidConfig(format!(
                "rating scale {}..={} is empty",
                self.scale.min, self.scale.max
            )));
        }
        Ok(())
    }

    /// Saturates at `Duration::MAX` for a day count `validate` would reject.
    pub fn freshness_window(&self) -> Duration {
        Duration::try_days(self.freshness_window_days).unwrap_or(Duration::MAX)
    }

    pub fn age_gap(&self) -> Duration {
        Duration::try_days(self.age_gap_days).unwrap_or(Duration::MAX)
    }
}

/// A day count must be non-negative and representable as a `Duration`.
fn check_days(field: &str, days: i64) -> Result<(), CoreError> {
    if days < 0 {
        return Err(CoreError::InvalidConfig(format!(
            "{field} must not be negative, got {days}"
        )));
    }
    if Duration::try_days(days).is_none() {
        return Err(CoreError::InvalidConfig(format!(
            "{field} is too large, got {days}"
        )));
    }
    Ok(())
}
