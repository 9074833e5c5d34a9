//! Keyed query cache with cancellable reads
//!
//! A read registers itself for its key and records the key's generation
//! before it starts fetching. It only stores its result if the generation is
//! unchanged when the fetch returns. [`QueryCache::cancel_queries`] bumps the
//! generation, so any read already in flight for that key is discarded
//! instead of overwriting newer data.
//!
//! Keys are tracked only while a read is in flight; the last reader to
//! finish (or be dropped) removes the key's state.

use crate::error::CacheError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use moka::future::Cache;
use patchwork_core::EngineConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Transformation applied to a cached value; `None` in or out means absent
pub type QueryUpdater = Box<dyn FnOnce(Option<Value>) -> Option<Value> + Send>;

/// Cache contract used by the optimistic gate
#[async_trait::async_trait]
pub trait QueryCache: Send + Sync {
    /// Discard reads for `key` that are still in flight
    async fn cancel_queries(&self, key: &str);

    /// Current cached value
    async fn get_query_data(&self, key: &str) -> Option<Value>;

    /// Replace the cached value with `updater(current)`, returning the new value
    async fn set_query_data(&self, key: &str, updater: QueryUpdater) -> Option<Value>;

    /// Drop the cached value
    async fn remove_query_data(&self, key: &str);

    /// Read `key` from its source and store the result
    async fn refetch_queries(&self, key: &str) -> Result<(), CacheError>;
}

/// Source of truth behind a [`MokaQueryCache`]
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait QueryFetcher: Send + Sync {
    /// Load the value for `key`
    async fn fetch(&self, key: &str) -> Result<Value, CacheError>;
}

/// Capacity and expiry of a [`MokaQueryCache`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached keys
    pub max_capacity: u64,
    /// Seconds a value lives before it must be fetched again
    pub ttl_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 1_000,
            ttl_secs: None,
        }
    }
}

impl From<&EngineConfig> for CacheConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_capacity: config.cache_capacity,
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
struct ReadState {
    generation: u64,
    readers: usize,
}

type InFlight = DashMap<String, ReadState>;

/// Registration of one in-flight read; unregisters on drop
struct ReadGuard<'a> {
    in_flight: &'a InFlight,
    key: &'a str,
}

impl<'a> ReadGuard<'a> {
    fn begin(in_flight: &'a InFlight, key: &'a str) -> (Self, u64) {
        let mut state = in_flight.entry(key.to_string()).or_default();
        state.readers += 1;
        let generation = state.generation;
        drop(state);
        (Self { in_flight, key }, generation)
    }

    fn generation(&self) -> Option<u64> {
        self.in_flight.get(self.key).map(|state| state.generation)
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        if let Entry::Occupied(mut entry) = self.in_flight.entry(self.key.to_string()) {
            let state = entry.get_mut();
            state.readers = state.readers.saturating_sub(1);
            if state.readers == 0 {
                entry.remove();
            }
        }
    }
}

/// [`QueryCache`] over `moka`
#[derive(Clone)]
pub struct MokaQueryCache {
    entries: Cache<String, Value>,
    in_flight: Arc<InFlight>,
    fetcher: Arc<dyn QueryFetcher>,
}

impl MokaQueryCache {
    /// Create cache with default capacity
    #[must_use]
    pub fn new(fetcher: Arc<dyn QueryFetcher>) -> Self {
        Self::with_config(fetcher, CacheConfig::default())
    }

    /// Create cache with explicit capacity and expiry
    #[must_use]
    pub fn with_config(fetcher: Arc<dyn QueryFetcher>, config: CacheConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.max_capacity);
        if let Some(secs) = config.ttl_secs {
            builder = builder.time_to_live(Duration::from_secs(secs));
        }
        Self {
            entries: builder.build(),
            in_flight: Arc::new(DashMap::new()),
            fetcher,
        }
    }

    /// Cached value, or a fresh read stored unless cancelled meanwhile
    pub async fn fetch_query(&self, key: &str) -> Result<Value, CacheError> {
        if let Some(cached) = self.entries.get(key).await {
            return Ok(cached);
        }
        self.load(key).await
    }

    /// Approximate number of cached keys
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Number of keys with a read in flight
    #[inline]
    #[must_use]
    pub fn in_flight_keys(&self) -> usize {
        self.in_flight.len()
    }

    async fn load(&self, key: &str) -> Result<Value, CacheError> {
        let (read, started) = ReadGuard::begin(&self.in_flight, key);
        let value = self.fetcher.fetch(key).await?;
        if read.generation() == Some(started) {
            self.entries.insert(key.to_string(), value.clone()).await;
        } else {
            tracing::debug!(key, "discarding cancelled read");
        }
        Ok(value)
    }
}

impl fmt::Debug for MokaQueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MokaQueryCache")
            .field("entries", &self.entries.entry_count())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl QueryCache for MokaQueryCache {
    async fn cancel_queries(&self, key: &str) {
        if let Some(mut state) = self.in_flight.get_mut(key) {
            state.generation += 1;
            tracing::debug!(key, readers = state.readers, "cancelled in-flight reads");
        }
    }

    async fn get_query_data(&self, key: &str) -> Option<Value> {
        self.entries.get(key).await
    }

    async fn set_query_data(&self, key: &str, updater: QueryUpdater) -> Option<Value> {
        let current = self.entries.get(key).await;
        match updater(current) {
            Some(next) => {
                self.entries.insert(key.to_string(), next.clone()).await;
                Some(next)
            }
            None => {
                self.entries.invalidate(key).await;
                None
            }
        }
    }

    async fn remove_query_data(&self, key: &str) {
        self.entries.invalidate(key).await;
    }

    async fn refetch_queries(&self, key: &str) -> Result<(), CacheError> {
        self.load(key).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchwork_core::ServiceError;
    use serde_json::json;
    use tokio::sync::Notify;

    fn fetcher_returning(value: Value) -> MockQueryFetcher {
        let mut fetcher = MockQueryFetcher::new();
        fetcher
            .expect_fetch()
            .returning(move |_| Ok(value.clone()));
        fetcher
    }

    #[tokio::test]
    async fn fetch_reads_through_once() {
        let mut fetcher = MockQueryFetcher::new();
        fetcher
            .expect_fetch()
            .withf(|key| key == "flow:a")
            .times(1)
            .returning(|_| Ok(json!({"id": "a"})));
        let cache = MokaQueryCache::new(Arc::new(fetcher));

        assert_eq!(cache.fetch_query("flow:a").await.unwrap(), json!({"id": "a"}));
        assert_eq!(cache.fetch_query("flow:a").await.unwrap(), json!({"id": "a"}));
    }

    #[tokio::test]
    async fn fetch_error_is_not_cached() {
        let mut fetcher = MockQueryFetcher::new();
        fetcher.expect_fetch().times(1).returning(|key| {
            Err(CacheError::Fetch {
                key: key.to_string(),
                source: ServiceError::Unavailable("down".into()),
            })
        });
        let cache = MokaQueryCache::new(Arc::new(fetcher));

        assert!(cache.fetch_query("flow:a").await.unwrap_err().is_fetch());
        assert_eq!(cache.get_query_data("flow:a").await, None);
    }

    #[tokio::test]
    async fn updater_returning_none_removes_entry() {
        let cache = MokaQueryCache::new(Arc::new(fetcher_returning(json!(1))));
        cache.fetch_query("k").await.unwrap();

        let next = cache
            .set_query_data("k", Box::new(|v| v.map(|n| json!(n.as_i64().unwrap_or(0) + 1))))
            .await;
        assert_eq!(next, Some(json!(2)));

        assert_eq!(cache.set_query_data("k", Box::new(|_| None)).await, None);
        assert_eq!(cache.get_query_data("k").await, None);
    }

    #[tokio::test]
    async fn refetch_overwrites_local_value() {
        let cache = MokaQueryCache::new(Arc::new(fetcher_returning(json!("truth"))));
        cache
            .set_query_data("k", Box::new(|_| Some(json!("guess"))))
            .await;

        cache.refetch_queries("k").await.unwrap();

        assert_eq!(cache.get_query_data("k").await, Some(json!("truth")));
    }

    struct GatedFetcher {
        started: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait::async_trait]
    impl QueryFetcher for GatedFetcher {
        async fn fetch(&self, _key: &str) -> Result<Value, CacheError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(json!("stale"))
        }
    }

    #[tokio::test]
    async fn cancelled_read_is_not_stored() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let cache = MokaQueryCache::new(Arc::new(GatedFetcher {
            started: started.clone(),
            release: release.clone(),
        }));

        let pending = tokio::spawn({
            let cache = cache.clone();
            async move { cache.fetch_query("k").await }
        });
        started.notified().await;
        cache.cancel_queries("k").await;
        release.notify_one();

        assert_eq!(pending.await.unwrap().unwrap(), json!("stale"));
        assert_eq!(cache.get_query_data("k").await, None);
        assert_eq!(cache.in_flight_keys(), 0);
    }

    #[tokio::test]
    async fn cancelling_idle_keys_tracks_nothing() {
        let cache = MokaQueryCache::new(Arc::new(fetcher_returning(json!(1))));
        for n in 0..100 {
            cache.cancel_queries(&format!("flow:{n}")).await;
        }
        assert_eq!(cache.in_flight_keys(), 0);

        cache.fetch_query("flow:0").await.unwrap();
        cache.remove_query_data("flow:0").await;
        assert_eq!(cache.in_flight_keys(), 0);
    }

    #[tokio::test]
    async fn failed_or_dropped_reads_stop_being_tracked() {
        let mut failing = MockQueryFetcher::new();
        failing.expect_fetch().returning(|key| {
            Err(CacheError::Fetch {
                key: key.to_string(),
                source: ServiceError::Unavailable("down".into()),
            })
        });
        let cache = MokaQueryCache::new(Arc::new(failing));
        assert!(cache.fetch_query("k").await.is_err());
        assert_eq!(cache.in_flight_keys(), 0);

        let started = Arc::new(Notify::new());
        let cache = MokaQueryCache::new(Arc::new(GatedFetcher {
            started: started.clone(),
            release: Arc::new(Notify::new()),
        }));
        let pending = tokio::spawn({
            let cache = cache.clone();
            async move { cache.fetch_query("k").await }
        });
        started.notified().await;
        assert_eq!(cache.in_flight_keys(), 1);

        pending.abort();
        assert!(pending.await.unwrap_err().is_cancelled());
        assert_eq!(cache.in_flight_keys(), 0);
    }

    #[tokio::test]
    async fn read_started_after_cancel_is_stored() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let cache = MokaQueryCache::new(Arc::new(GatedFetcher {
            started: started.clone(),
            release: release.clone(),
        }));

        let first = tokio::spawn({
            let cache = cache.clone();
            async move { cache.fetch_query("k").await }
        });
        started.notified().await;
        cache.cancel_queries("k").await;
        release.notify_one();
        first.await.unwrap().unwrap();
        assert_eq!(cache.in_flight_keys(), 0);

        let second = tokio::spawn({
            let cache = cache.clone();
            async move { cache.fetch_query("k").await }
        });
        started.notified().await;
        release.notify_one();
        second.await.unwrap().unwrap();
        assert_eq!(cache.get_query_data("k").await, Some(json!("stale")));
    }

    #[test]
    fn config_from_json_fills_defaults() {
        let config: CacheConfig = serde_json::from_value(json!({"ttl_secs": 30})).unwrap();
        assert_eq!(config.max_capacity, 1_000);
        assert_eq!(config.ttl_secs, Some(30));

        let engine = EngineConfig {
            cache_capacity: 16,
            ..EngineConfig::default()
        };
        assert_eq!(CacheConfig::from(&engine).max_capacity, 16);
    }
}
