use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use crate::api::errors::FlagError;
use crate::flags::flag_models::{Environment, FlagRecord};
use crate::flags::flag_store::FlagStore;
use crate::metrics::consts::{
    DB_FLAG_READS_COUNTER, FLAG_CACHE_ERRORS_COUNTER, FLAG_CACHE_HIT_COUNTER,
};
use crate::metrics::utils::inc;

/// Immutable set of flag records for one `(feature_key, environment)` pair.
pub type FlagSnapshot = Arc<[FlagRecord]>;

/// In-memory, short-lived snapshot cache in front of a [`FlagStore`].
///
/// - **TTL**: entries expire after the configured TTL, so a flag flipped by an
///   administrator is picked up without a restart.
/// - **Per-key coalescing**: concurrent misses for the same feature and
///   environment share a single store read via `try_get_with`.
/// - **Errors are not cached**: a failed read is returned to every waiter and the
///   next request goes back to the store.
/// - **Explicit invalidation**: [`CachedFlagStore::invalidate`] drops a feature's
///   snapshots in both environments.
pub struct CachedFlagStore<S: FlagStore> {
    inner: Arc<S>,
    cache: Cache<(String, Environment), FlagSnapshot>,
}

impl<S: FlagStore> CachedFlagStore<S> {
    pub fn new(inner: S, ttl: Duration, max_entries: u64) -> Self {
        let cache = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(max_entries)
            .build();

        Self {
            inner: Arc::new(inner),
            cache,
        }
    }

    pub async fn get_snapshot(
        &self,
        feature_key: &str,
        environment: Environment,
    ) -> Result<FlagSnapshot, FlagError> {
        let key = (feature_key.to_string(), environment);
        let labels = [("feature_key".to_string(), feature_key.to_string())];

        if let Some(snapshot) = self.cache.get(&key).await {
            inc(FLAG_CACHE_HIT_COUNTER, &labels, 1);
            return Ok(snapshot);
        }

        let inner = self.inner.clone();
        let fetch_key = feature_key.to_string();
        let result = self
            .cache
            .try_get_with(key, async move {
                inc(DB_FLAG_READS_COUNTER, &[], 1);
                inner
                    .fetch_flags(&fetch_key, environment)
                    .await
                    .map(FlagSnapshot::from)
            })
            .await;

        result.map_err(|e: Arc<FlagError>| {
            inc(FLAG_CACHE_ERRORS_COUNTER, &labels, 1);
            tracing::warn!(feature_key, %environment, "failed to load flag snapshot: {}", e);
            Arc::try_unwrap(e).unwrap_or_else(|shared| owned_error(&shared))
        })
    }

    pub async fn invalidate(&self, feature_key: &str) {
        for environment in Environment::ALL {
            self.cache
                .invalidate(&(feature_key.to_string(), environment))
                .await;
        }
        tracing::info!(feature_key, "invalidated cached flag snapshots");
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
        tracing::info!("invalidated all cached flag snapshots");
    }
}

// Waiters on a coalesced load share one error, so rebuild an owned copy.
fn owned_error(shared: &FlagError) -> FlagError {
    match shared {
        FlagError::DatabaseUnavailable => FlagError::DatabaseUnavailable,
        FlagError::TimeoutError(kind) => FlagError::TimeoutError(kind.clone()),
        FlagError::DataParsingError => FlagError::DataParsingError,
        FlagError::UnknownEnumValue(field, value) => {
            FlagError::UnknownEnumValue(field.clone(), value.clone())
        }
        other => FlagError::Internal(format!("shared flag load failure: {other}")),
    }
}

#[async_trait]
impl<S: FlagStore> FlagStore for CachedFlagStore<S> {
    async fn fetch_flags(
        &self,
        feature_key: &str,
        environment: Environment,
    ) -> Result<Vec<FlagRecord>, FlagError> {
        Ok(self.get_snapshot(feature_key, environment).await?.to_vec())
    }

    async fn ping(&self) -> Result<(), FlagError> {
        self.inner.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::flag_models::ScopeType;
    use crate::utils::test_utils::{flag, InMemoryFlagStore};

    fn cached(
        store: Arc<InMemoryFlagStore>,
        ttl: Duration,
    ) -> CachedFlagStore<Arc<InMemoryFlagStore>> {
        CachedFlagStore::new(store, ttl, 100)
    }

    #[tokio::test]
    async fn test_second_read_is_served_from_cache() {
        let store = Arc::new(InMemoryFlagStore::new(vec![flag(
            ScopeType::Global,
            None,
            "chat",
            None,
            Environment::Prod,
            true,
        )]));
        let cache = cached(store.clone(), Duration::from_secs(30));

        let first = cache.get_snapshot("chat", Environment::Prod).await.unwrap();
        let second = cache.get_snapshot("chat", Environment::Prod).await.unwrap();

        assert_eq!(first.len(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.read_count(), 1);
    }

    #[tokio::test]
    async fn test_environments_are_cached_separately() {
        let store = Arc::new(InMemoryFlagStore::new(vec![flag(
            ScopeType::Global,
            None,
            "chat",
            None,
            Environment::Dev,
            true,
        )]));
        let cache = cached(store.clone(), Duration::from_secs(30));

        assert_eq!(cache.get_snapshot("chat", Environment::Dev).await.unwrap().len(), 1);
        assert!(cache.get_snapshot("chat", Environment::Prod).await.unwrap().is_empty());
        assert_eq!(store.read_count(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_is_stale_until_invalidated() {
        let store = Arc::new(InMemoryFlagStore::new(vec![flag(
            ScopeType::Global,
            None,
            "chat",
            None,
            Environment::Prod,
            true,
        )]));
        let cache = cached(store.clone(), Duration::from_secs(30));
        assert!(cache.get_snapshot("chat", Environment::Prod).await.unwrap()[0].enabled);

        store.replace(vec![flag(ScopeType::Global, None, "chat", None, Environment::Prod, false)]);
        assert!(cache.get_snapshot("chat", Environment::Prod).await.unwrap()[0].enabled);

        cache.invalidate("chat").await;
        assert!(!cache.get_snapshot("chat", Environment::Prod).await.unwrap()[0].enabled);
    }

    #[tokio::test]
    async fn test_snapshot_expires_after_ttl() {
        let store = Arc::new(InMemoryFlagStore::new(vec![]));
        let cache = cached(store.clone(), Duration::from_millis(50));

        cache.get_snapshot("faq", Environment::Dev).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        cache.get_snapshot("faq", Environment::Dev).await.unwrap();

        assert_eq!(store.read_count(), 2);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let store = Arc::new(InMemoryFlagStore::new(vec![]));
        store.set_failing(true);
        let cache = cached(store.clone(), Duration::from_secs(30));

        assert!(matches!(
            cache.get_snapshot("chat", Environment::Prod).await,
            Err(FlagError::DatabaseUnavailable)
        ));

        store.set_failing(false);
        assert!(cache.get_snapshot("chat", Environment::Prod).await.is_ok());
        assert_eq!(store.read_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_coalesce() {
        let store = Arc::new(InMemoryFlagStore::new(vec![]).with_delay(Duration::from_millis(50)));
        let cache = Arc::new(cached(store.clone(), Duration::from_secs(30)));

        let reads = (0..8).map(|_| {
            let cache = cache.clone();
            async move { cache.get_snapshot("chat", Environment::Prod).await }
        });
        let results = futures::future::join_all(reads).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(store.read_count(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let store = Arc::new(InMemoryFlagStore::new(vec![]));
        let cache = cached(store.clone(), Duration::from_secs(30));

        cache.get_snapshot("chat", Environment::Prod).await.unwrap();
        cache.get_snapshot("faq", Environment::Prod).await.unwrap();
        cache.invalidate_all();
        cache.get_snapshot("chat", Environment::Prod).await.unwrap();

        assert_eq!(store.read_count(), 3);
    }
}
