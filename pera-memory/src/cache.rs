use std::future::Future;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::RwLock;
use uuid::Uuid;

/// Read-through LRU cache in front of `getSkill`/`getEpisode`, grounded in
/// `memory-core/src/retrieval/cache/lru.rs`. Holds clones of the cached
/// value; callers provide the miss-path loader.
pub struct ReadThroughCache<V: Clone> {
    entries: RwLock<LruCache<Uuid, V>>,
}

impl<V: Clone> ReadThroughCache<V> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self { entries: RwLock::new(LruCache::new(capacity)) }
    }

    pub fn invalidate(&self, id: Uuid) {
        self.entries.write().pop(&id);
    }

    /// Return the cached value for `id`, or call `loader` on a miss,
    /// populating the cache with whatever it returns (including `None`
    /// results are not cached, matching "never fails on read-missing").
    pub async fn get_or_load<E, F, Fut>(&self, id: Uuid, loader: F) -> Result<Option<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
    {
        if let Some(hit) = self.entries.write().get(&id).cloned() {
            return Ok(Some(hit));
        }
        let loaded = loader().await?;
        if let Some(value) = &loaded {
            self.entries.write().put(id, value.clone());
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn second_lookup_is_a_cache_hit() {
        let cache: ReadThroughCache<String> = ReadThroughCache::new(4);
        let id = Uuid::new_v4();
        let loads = AtomicUsize::new(0);

        let first = cache
            .get_or_load::<std::convert::Infallible, _, _>(id, || async {
                loads.fetch_add(1, Ordering::Relaxed);
                Ok(Some("value".to_string()))
            })
            .await
            .unwrap();
        let second = cache
            .get_or_load::<std::convert::Infallible, _, _>(id, || async {
                loads.fetch_add(1, Ordering::Relaxed);
                Ok(Some("value".to_string()))
            })
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(loads.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_reload() {
        let cache: ReadThroughCache<String> = ReadThroughCache::new(4);
        let id = Uuid::new_v4();
        let loads = AtomicUsize::new(0);
        let load = || async {
            loads.fetch_add(1, Ordering::Relaxed);
            Ok::<_, std::convert::Infallible>(Some("value".to_string()))
        };

        cache.get_or_load(id, load).await.unwrap();
        cache.invalidate(id);
        cache.get_or_load(id, load).await.unwrap();
        assert_eq!(loads.load(Ordering::Relaxed), 2);
    }
}
