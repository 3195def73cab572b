//! The adapter seam between live rating sources and the matching core.

use async_trait::async_trait;
use reelmatch_core::{Candidate, FreshObservation};

use crate::SourceError;

/// A live source of search results and ratings (IMDb, Rotten Tomatoes, ...).
///
/// Implementations hand the core records that are already shaped: turning
/// a response body into [`Candidate`]s happens inside the adapter.
#[async_trait]
pub trait RatingSource: Send + Sync {
    /// Short stable name, used as the provenance tag on observations.
    fn name(&self) -> &str;

    /// Search results for a title, in the source's own ranking order.
    async fn search(&self, title: &str, year: Option<i32>) -> Result<Vec<Candidate>, SourceError>;

    /// Current rating for a resolved candidate, or `None` if the source has none.
    async fn fetch_rating(
        &self,
        external_ref: &str,
    ) -> Result<Option<FreshObservation>, SourceError>;
}

#[async_trait]
impl<S: RatingSource + ?Sized> RatingSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn search(&self, title: &str, year: Option<i32>) -> Result<Vec<Candidate>, SourceError> {
        (**self).search(title, year).await
    }

    async fn fetch_rating(
        &self,
        external_ref: &str,
    ) -> Result<Option<FreshObservation>, SourceError> {
        (**self).fetch_rating(external_ref).await
    }
}
