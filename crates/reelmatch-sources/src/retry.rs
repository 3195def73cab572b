//! Retry with exponential backoff, plus optional pacing between calls.

use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reelmatch_core::{Candidate, FreshObservation};
use tracing::warn;

use crate::{RatingSource, SourceError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. 1 disables retrying.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), SourceError> {
        if self.max_attempts == 0 {
            return Err(SourceError::InvalidPolicy(
                "max_attempts must be at least 1".into(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(SourceError::InvalidPolicy(format!(
                "multiplier must be a number >= 1, got {}",
                self.multiplier
            )));
        }
        if self.initial_backoff > self.max_backoff {
            return Err(SourceError::InvalidPolicy(format!(
                "initial_backoff {:?} exceeds max_backoff {:?}",
                self.initial_backoff, self.max_backoff
            )));
        }
        Ok(())
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.max(1.0).powi(exp);
        Duration::from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
    }
}

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Wraps a source so transient failures are retried and calls are paced.
pub struct Retrying<S> {
    inner: S,
    policy: RetryPolicy,
    limiter: Option<Limiter>,
}

impl<S: RatingSource> Retrying<S> {
    /// Fails if `policy` does not validate.
    pub fn new(inner: S, policy: RetryPolicy) -> Result<Self, SourceError> {
        policy.validate()?;
        Ok(Self {
            inner,
            policy,
            limiter: None,
        })
    }

    /// Leave at least `interval` between consecutive calls to the source,
    /// retries included. A zero interval disables pacing.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.limiter = Quota::with_period(interval).map(RateLimiter::direct);
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let mut attempt = 1;
        loop {
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        source = self.inner.name(),
                        op,
                        attempt,
                        ?delay,
                        error = %e,
                        "retrying source call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<S: RatingSource> RatingSource for Retrying<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn search(&self, title: &str, year: Option<i32>) -> Result<Vec<Candidate>, SourceError> {
        self.with_retry("search", || self.inner.search(title, year))
            .await
    }

    async fn fetch_rating(
        &self,
        external_ref: &str,
    ) -> Result<Option<FreshObservation>, SourceError> {
        self.with_retry("fetch_rating", || self.inner.fetch_rating(external_ref))
            .await
    }
}
