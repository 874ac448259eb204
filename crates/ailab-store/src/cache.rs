//! Async memo cache using [`moka`].
//!
//! [`CacheLayer`] stores any `Serialize + DeserializeOwned` value as JSON in
//! a `moka::future::Cache`, bounded by entry count and time-to-live.  The
//! routing layer uses it to avoid re-embedding the same text.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

// ── stats ────────────────────────────────────────────────────────────

/// Hit / miss counters for one cache.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn lookups(&self) -> u64 {
        self.hits() + self.misses()
    }

    /// Fraction of lookups served from the cache, `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            total => self.hits() as f64 / total as f64,
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} rate={:.1}%",
            self.hits(),
            self.misses(),
            self.hit_rate() * 100.0,
        )
    }
}

// ── cache layer ──────────────────────────────────────────────────────

/// A named, bounded, JSON-backed async cache.
///
/// ```ignore
/// let embeddings: CacheLayer<Vec<f32>> = CacheLayer::builder("embeddings")
///     .max_capacity(5_000)
///     .ttl_seconds(3_600)
///     .build();
///
/// let vector = embeddings
///     .get_or_try_insert_with(&key, || async { embed(text).await })
///     .await?;
/// ```
pub struct CacheLayer<T> {
    name: Arc<str>,
    inner: Cache<String, String>,
    stats: Arc<CacheStats>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for CacheLayer<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            inner: self.inner.clone(),
            stats: Arc::clone(&self.stats),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for CacheLayer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheLayer")
            .field("name", &self.name)
            .field("entries", &self.inner.entry_count())
            .field("stats", &*self.stats)
            .finish()
    }
}

impl<T> CacheLayer<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Start building a cache with the given diagnostic name.
    pub fn builder(name: impl Into<String>) -> CacheLayerBuilder<T> {
        CacheLayerBuilder {
            name: name.into(),
            max_capacity: 10_000,
            ttl: Duration::from_secs(300),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a value.  A corrupt entry is evicted and counted as a miss.
    pub async fn get(&self, key: &str) -> Option<T> {
        let Some(raw) = self.inner.get(key).await else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            debug!(cache = %self.name, key, "cache miss");
            return None;
        };

        match serde_json::from_str::<T>(&raw) {
            Ok(value) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                debug!(cache = %self.name, key, "cache hit");
                Some(value)
            }
            Err(err) => {
                warn!(cache = %self.name, key, %err, "evicting undecodable cache entry");
                self.inner.invalidate(key).await;
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn insert(&self, key: &str, value: &T) -> StoreResult<()> {
        let raw = serde_json::to_string(value).map_err(|e| StoreError::Cache(e.to_string()))?;
        self.inner.insert(key.to_string(), raw).await;
        Ok(())
    }

    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Return the cached value or compute, store and return it.
    ///
    /// Loader errors are returned unchanged and nothing is cached.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: &str, loader: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<StoreError>,
    {
        if let Some(hit) = self.get(key).await {
            return Ok(hit);
        }
        let value = loader().await?;
        self.insert(key, &value).await?;
        Ok(value)
    }
}

// ── builder ──────────────────────────────────────────────────────────

/// Builder for [`CacheLayer`].
pub struct CacheLayerBuilder<T> {
    name: String,
    max_capacity: u64,
    ttl: Duration,
    _marker: PhantomData<fn() -> T>,
}

impl<T> CacheLayerBuilder<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn max_capacity(mut self, cap: u64) -> Self {
        self.max_capacity = cap;
        self
    }

    pub fn ttl_seconds(mut self, secs: u64) -> Self {
        self.ttl = Duration::from_secs(secs);
        self
    }

    pub fn build(self) -> CacheLayer<T> {
        debug!(
            name = %self.name,
            max_capacity = self.max_capacity,
            ttl_secs = self.ttl.as_secs(),
            "cache layer created"
        );
        CacheLayer {
            name: Arc::from(self.name),
            inner: Cache::builder()
                .max_capacity(self.max_capacity)
                .time_to_live(self.ttl)
                .build(),
            stats: Arc::new(CacheStats::default()),
            _marker: PhantomData,
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────
