//! Matching and rating reconciliation: title normalisation, candidate
//! resolution, and baseline/live rating fusion. Pure functions, no I/O.

pub mod config;
mod error;
pub mod fusion;
pub mod model;
pub mod normalize;
pub mod resolve;
pub mod similarity;

pub use config::{FusionConfig, MatchConfig, RatingScale};
pub use error::CoreError;
pub use fusion::fuse;
pub use model::{
    Baseline, Candidate, CanonicalEntity, Contribution, FreshObservation, FusedScore,
    FusionStrategy, MatchResult, MediaKind,
};
pub use normalize::normalize;
pub use resolve::{ScoredCandidate, resolve, score_candidates};
pub use similarity::{ScoreBreakdown, Strategy, score, score_breakdown};
