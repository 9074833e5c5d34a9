//! Optimistic cache gate
//!
//! Shows a predicted value immediately while the real mutation runs, then
//! either replaces it with ground truth or puts back exactly what was there.

use crate::query::QueryCache;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Runs mutations behind an optimistic cache update
#[derive(Clone)]
pub struct OptimisticCacheGate {
    cache: Arc<dyn QueryCache>,
}

impl OptimisticCacheGate {
    /// Create gate over `cache`
    #[inline]
    #[must_use]
    pub fn new(cache: Arc<dyn QueryCache>) -> Self {
        Self { cache }
    }

    /// The gated cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn QueryCache> {
        &self.cache
    }

    /// Apply `optimistic` to `key`, then await `mutation`
    ///
    /// In-flight reads of `key` are cancelled first so they cannot clobber the
    /// optimistic value. On success the key is refetched; a failed refetch is
    /// logged and leaves the optimistic value in place. On failure the
    /// snapshot taken before the update is restored (or the key removed if it
    /// was absent) and the mutation's error is returned unchanged.
    pub async fn run<T, E, U, M>(&self, key: &str, optimistic: U, mutation: M) -> Result<T, E>
    where
        U: FnOnce(Option<Value>) -> Option<Value> + Send + 'static,
        M: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.cache.cancel_queries(key).await;
        let snapshot = self.cache.get_query_data(key).await;
        self.cache.set_query_data(key, Box::new(optimistic)).await;

        match mutation.await {
            Ok(value) => {
                if let Err(e) = self.cache.refetch_queries(key).await {
                    tracing::warn!(key, error = %e, "refetch after mutation failed");
                }
                Ok(value)
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "mutation failed, restoring snapshot");
                match snapshot {
                    Some(previous) => {
                        self.cache
                            .set_query_data(key, Box::new(move |_| Some(previous)))
                            .await;
                    }
                    None => self.cache.remove_query_data(key).await,
                }
                Err(e)
            }
        }
    }
}

impl fmt::Debug for OptimisticCacheGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimisticCacheGate").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use crate::query::{MockQueryFetcher, MokaQueryCache};
    use patchwork_core::ServiceError;
    use serde_json::json;

    fn push(item: Value) -> impl FnOnce(Option<Value>) -> Option<Value> + Send + 'static {
        move |current| {
            let mut list = current.unwrap_or_else(|| json!([]));
            if let Some(items) = list.as_array_mut() {
                items.push(item);
            }
            Some(list)
        }
    }

    async fn seeded(fetcher: MockQueryFetcher, value: Value) -> Arc<MokaQueryCache> {
        let cache = Arc::new(MokaQueryCache::new(Arc::new(fetcher)));
        cache.set_query_data("k", Box::new(move |_| Some(value))).await;
        cache
    }

    #[tokio::test]
    async fn success_replaces_optimistic_value_with_fresh_read() {
        let mut fetcher = MockQueryFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(json!(["a", "b", "server"])));
        let cache = seeded(fetcher, json!(["a"])).await;
        let gate = OptimisticCacheGate::new(cache.clone());

        let observed = cache.clone();
        let result: Result<u8, CacheError> = gate
            .run("k", push(json!("b")), async move {
                assert_eq!(observed.get_query_data("k").await, Some(json!(["a", "b"])));
                Ok(7)
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(cache.get_query_data("k").await, Some(json!(["a", "b", "server"])));
    }

    #[tokio::test]
    async fn failure_restores_exact_snapshot() {
        let mut fetcher = MockQueryFetcher::new();
        fetcher.expect_fetch().never();
        let cache = seeded(fetcher, json!(["a"])).await;
        let gate = OptimisticCacheGate::new(cache.clone());

        let result: Result<(), String> = gate
            .run("k", push(json!("b")), async { Err("rejected".to_string()) })
            .await;

        assert_eq!(result.unwrap_err(), "rejected");
        assert_eq!(cache.get_query_data("k").await, Some(json!(["a"])));
    }

    #[tokio::test]
    async fn failure_removes_value_that_was_absent() {
        let cache = Arc::new(MokaQueryCache::new(Arc::new(MockQueryFetcher::new())));
        let gate = OptimisticCacheGate::new(cache.clone());

        let result: Result<(), String> = gate
            .run("k", push(json!("b")), async { Err("rejected".to_string()) })
            .await;

        assert!(result.is_err());
        assert_eq!(cache.get_query_data("k").await, None);
    }

    #[tokio::test]
    async fn refetch_failure_keeps_optimistic_value() {
        let mut fetcher = MockQueryFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|key| {
                Err(CacheError::Fetch {
                    key: key.to_string(),
                    source: ServiceError::Unavailable("timeout".into()),
                })
            });
        let cache = seeded(fetcher, json!(["a"])).await;
        let gate = OptimisticCacheGate::new(cache.clone());

        let result: Result<(), CacheError> = gate.run("k", push(json!("b")), async { Ok(()) }).await;

        assert!(result.is_ok());
        assert_eq!(cache.get_query_data("k").await, Some(json!(["a", "b"])));
    }
}
