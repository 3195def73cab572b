//! Memoising wrapper for rating sources.
//!
//! Searches are keyed by normalised title plus year, ratings by external
//! reference. Entries expire after a TTL; past `capacity` the oldest entry
//! is evicted. Errors are never cached. The cache belongs to whoever builds
//! the wrapper; there is no shared or global state.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reelmatch_core::{Candidate, FreshObservation, normalize};
use tracing::trace;

use crate::{RatingSource, SourceError};

struct Entries<V> {
    map: HashMap<String, (Instant, V)>,
    order: VecDeque<String>,
}

impl<V: Clone> Entries<V> {
    fn new() -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &str, ttl: Duration) -> Option<V> {
        self.map
            .get(key)
            .filter(|(at, _)| at.elapsed() < ttl)
            .map(|(_, v)| v.clone())
    }

    fn insert(&mut self, key: String, value: V, capacity: usize) {
        if self.map.insert(key.clone(), (Instant::now(), value)).is_some() {
            self.order.retain(|k| k != &key);
        }
        self.order.push_back(key);
        while self.map.len() > capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.map.remove(&oldest);
        }
    }

    fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

/// Wraps a source and memoises successful searches and rating fetches.
pub struct Cached<S> {
    inner: S,
    ttl: Duration,
    capacity: usize,
    searches: Mutex<Entries<Vec<Candidate>>>,
    ratings: Mutex<Entries<Option<FreshObservation>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<S: RatingSource> Cached<S> {
    /// `capacity` bounds each of the search and rating caches separately.
    pub fn new(inner: S, ttl: Duration, capacity: usize) -> Self {
        Self {
            inner,
            ttl,
            capacity: capacity.max(1),
            searches: Mutex::new(Entries::new()),
            ratings: Mutex::new(Entries::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Number of cached searches and ratings.
    pub fn len(&self) -> usize {
        lock(&self.searches).len() + lock(&self.ratings).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.searches).clear();
        lock(&self.ratings).clear();
    }

    fn record(&self, hit: bool, op: &'static str, key: &str) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        trace!(source = self.inner.name(), op, key, hit, "cache lookup");
    }
}

/// Poisoning is ignored: entries are inserted whole, so the map is never half-updated.
fn lock<V>(m: &Mutex<Entries<V>>) -> std::sync::MutexGuard<'_, Entries<V>> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn search_key(title: &str, year: Option<i32>) -> String {
    match year {
        Some(y) => format!("{}|{y}", normalize(title)),
        None => format!("{}|", normalize(title)),
    }
}

#[async_trait]
impl<S: RatingSource> RatingSource for Cached<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn search(&self, title: &str, year: Option<i32>) -> Result<Vec<Candidate>, SourceError> {
        let key = search_key(title, year);
        let cached = lock(&self.searches).get(&key, self.ttl);
        self.record(cached.is_some(), "search", &key);
        if let Some(results) = cached {
            return Ok(results);
        }

        let results = self.inner.search(title, year).await?;
        lock(&self.searches).insert(key, results.clone(), self.capacity);
        Ok(results)
    }

    async fn fetch_rating(
        &self,
        external_ref: &str,
    ) -> Result<Option<FreshObservation>, SourceError> {
        let cached = lock(&self.ratings).get(external_ref, self.ttl);
        self.record(cached.is_some(), "fetch_rating", external_ref);
        if let Some(obs) = cached {
            return Ok(obs);
        }

        let obs = self.inner.fetch_rating(external_ref).await?;
        lock(&self.ratings).insert(external_ref.to_string(), obs.clone(), self.capacity);
        Ok(obs)
    }
}
