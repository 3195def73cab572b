//! Source layer: the [`RatingSource`] adapter seam, snapshot-backed sources,
//! retry and cache wrappers, and the [`Reconciler`] that drives catalog
//! entities through resolution and fusion.

pub mod cache;
mod error;
pub mod reconcile;
pub mod retry;
pub mod snapshot;
mod source;

pub use cache::Cached;
pub use error::SourceError;
pub use reconcile::{
    CatalogReport, CatalogSummary, EntityReport, Reconciler, RejectedEntity, SourceOutcome,
    SourceStatus,
};
pub use retry::{RetryPolicy, Retrying};
pub use snapshot::{RatingRecord, Snapshot, SnapshotSource, SourceSnapshot};
pub use source::RatingSource;
