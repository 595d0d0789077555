use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use ambit_types::{AmbitError, BoxError};
use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Mutex;

/// A process-wide singleton resource with an async preparation factory and
/// async disposal.
#[async_trait]
pub trait Dependency: Any + Send + Sync {
    async fn prepare() -> Result<Self, BoxError>
    where
        Self: Sized;

    async fn dispose(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

struct CacheEntry {
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
    lifecycle: Arc<dyn Dependency>,
}

/// Lazily-populated singleton cache keyed by dependency type.
///
/// The map lock is held across the preparation await, which is what
/// guarantees at-most-one concurrent preparation per type when resolutions
/// race from multiple scopes.
pub struct DependencyCache {
    entries: Mutex<HashMap<TypeId, CacheEntry>>,
}

/// The process-scoped cache. Explicit teardown happens through
/// [`DependencyCache::dispose_all`]; nothing is disposed implicitly.
pub fn dependencies() -> &'static DependencyCache {
    static CACHE: OnceLock<DependencyCache> = OnceLock::new();
    CACHE.get_or_init(|| DependencyCache {
        entries: Mutex::new(HashMap::new()),
    })
}

impl DependencyCache {
    /// Returns the cached singleton, preparing and storing it on first use.
    /// Every racing caller observes the same instance.
    pub async fn resolve<T: Dependency>(&self) -> Result<Arc<T>, AmbitError> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get(&TypeId::of::<T>()) {
            let value = Arc::clone(&entry.value).downcast::<T>().unwrap_or_else(|_| {
                panic!("cache entry stored under wrong type id for {}", entry.type_name)
            });
            return Ok(value);
        }
        let value = T::prepare()
            .await
            .map_err(|source| AmbitError::DependencyFailed {
                type_name: type_name::<T>(),
                source,
            })?;
        let value = Arc::new(value);
        entries.insert(
            TypeId::of::<T>(),
            CacheEntry {
                type_name: type_name::<T>(),
                value: value.clone(),
                lifecycle: value.clone(),
            },
        );
        Ok(value)
    }

    /// Replaces any existing entry of the same type, disposing the previous
    /// instance first. Disposal failures are logged, never raised.
    pub async fn register<T: Dependency>(&self, instance: T) {
        let mut entries = self.entries.lock().await;
        if let Some(previous) = entries.remove(&TypeId::of::<T>()) {
            if let Err(error) = previous.lifecycle.dispose().await {
                tracing::warn!(
                    dependency = previous.type_name,
                    %error,
                    "failed to dispose replaced dependency"
                );
            }
        }
        let value = Arc::new(instance);
        entries.insert(
            TypeId::of::<T>(),
            CacheEntry {
                type_name: type_name::<T>(),
                value: value.clone(),
                lifecycle: value,
            },
        );
    }

    /// Disposes every cached entry concurrently, then clears the cache.
    ///
    /// Runs on a detached task so a cancelled caller cannot leave shutdown
    /// half-finished.
    pub async fn dispose_all(&self) {
        let entries: Vec<CacheEntry> = {
            let mut map = self.entries.lock().await;
            map.drain().map(|(_, entry)| entry).collect()
        };
        if entries.is_empty() {
            return;
        }
        let shielded = tokio::spawn(async move {
            join_all(entries.into_iter().map(|entry| async move {
                if let Err(error) = entry.lifecycle.dispose().await {
                    tracing::warn!(
                        dependency = entry.type_name,
                        %error,
                        "dependency disposal failed"
                    );
                }
            }))
            .await;
        });
        let _ = shielded.await;
    }
}

#[cfg(test)]
mod tests {
    use super::{Dependency, DependencyCache};
    use ambit_types::BoxError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    fn fresh_cache() -> DependencyCache {
        DependencyCache {
            entries: Mutex::new(HashMap::new()),
        }
    }

    static PREPARED: AtomicUsize = AtomicUsize::new(0);

    struct SlowPool {
        serial: usize,
    }

    #[async_trait]
    impl Dependency for SlowPool {
        async fn prepare() -> Result<Self, BoxError> {
            let serial = PREPARED.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(Self { serial })
        }
    }

    static REPLACE_DISPOSED: AtomicUsize = AtomicUsize::new(0);

    struct ReplaceablePool {
        serial: usize,
    }

    #[async_trait]
    impl Dependency for ReplaceablePool {
        async fn prepare() -> Result<Self, BoxError> {
            Ok(Self { serial: 0 })
        }

        async fn dispose(&self) -> Result<(), BoxError> {
            REPLACE_DISPOSED.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    static CLEAR_DISPOSED: AtomicUsize = AtomicUsize::new(0);

    struct ClearablePool;

    #[async_trait]
    impl Dependency for ClearablePool {
        async fn prepare() -> Result<Self, BoxError> {
            Ok(Self)
        }

        async fn dispose(&self) -> Result<(), BoxError> {
            CLEAR_DISPOSED.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Broken;

    #[async_trait]
    impl Dependency for Broken {
        async fn prepare() -> Result<Self, BoxError> {
            Err("no database".into())
        }
    }

    #[tokio::test]
    async fn concurrent_resolutions_prepare_exactly_once() {
        let cache = std::sync::Arc::new(fresh_cache());
        PREPARED.store(0, Ordering::SeqCst);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(
                async move { cache.resolve::<SlowPool>().await },
            ));
        }
        let mut serials = Vec::new();
        for handle in handles {
            serials.push(handle.await.unwrap().unwrap().serial);
        }
        assert_eq!(PREPARED.load(Ordering::SeqCst), 1);
        assert!(serials.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn register_disposes_the_replaced_instance() {
        let cache = fresh_cache();
        cache.register(ReplaceablePool { serial: 1 }).await;
        assert_eq!(REPLACE_DISPOSED.load(Ordering::SeqCst), 0);
        cache.register(ReplaceablePool { serial: 2 }).await;
        assert_eq!(REPLACE_DISPOSED.load(Ordering::SeqCst), 1);
        assert_eq!(cache.resolve::<ReplaceablePool>().await.unwrap().serial, 2);
    }

    #[tokio::test]
    async fn preparation_failure_propagates_and_caches_nothing() {
        let cache = fresh_cache();
        let err = cache.resolve::<Broken>().await.unwrap_err();
        assert!(err.to_string().contains("no database"), "{err}");
        // A later attempt retries the factory.
        assert!(cache.resolve::<Broken>().await.is_err());
    }

    static NOISY_STARTED: AtomicUsize = AtomicUsize::new(0);
    static NOISY_DONE: AtomicUsize = AtomicUsize::new(0);

    struct NoisyShutdown;

    #[async_trait]
    impl Dependency for NoisyShutdown {
        async fn prepare() -> Result<Self, BoxError> {
            Ok(Self)
        }

        async fn dispose(&self) -> Result<(), BoxError> {
            NOISY_STARTED.fetch_add(1, Ordering::SeqCst);
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
            NOISY_DONE.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn dispose_all_survives_cancellation_of_the_caller() {
        let cache = std::sync::Arc::new(fresh_cache());
        cache.register(NoisyShutdown).await;

        let caller = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.dispose_all().await })
        };
        while NOISY_STARTED.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        caller.abort();
        // The detached disposal task still runs to completion.
        while NOISY_DONE.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(cache.entries.lock().await.is_empty());
    }

    #[tokio::test]
    async fn dispose_all_clears_the_cache() {
        let cache = fresh_cache();
        cache.register(ClearablePool).await;
        cache.dispose_all().await;
        assert_eq!(CLEAR_DISPOSED.load(Ordering::SeqCst), 1);
        assert!(cache.entries.lock().await.is_empty());
    }
}
