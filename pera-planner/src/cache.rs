use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use pera_types::plan::Plan;
use sha2::{Digest, Sha256};

/// Short-lived LRU cache of recent plans keyed by the SHA-256 of the
/// normalized goal text (`spec.md` §4.4 "Result. ... Caching"), following
/// the teacher's `QueryCache` (`memory-core/src/retrieval/cache/lru.rs`)
/// but keyed by a content hash rather than a structured query key, since a
/// plan cache's key is just the goal string.
pub struct PlanCache {
    entries: Mutex<LruCache<String, Plan>>,
}

impl PlanCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self { entries: Mutex::new(LruCache::new(capacity)) }
    }

    #[must_use]
    pub fn key_for(normalized_goal: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(normalized_goal.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    #[must_use]
    pub fn get(&self, normalized_goal: &str) -> Option<Plan> {
        self.entries.lock().get(&Self::key_for(normalized_goal)).cloned()
    }

    pub fn put(&self, normalized_goal: &str, plan: Plan) {
        self.entries.lock().put(Self::key_for(normalized_goal), plan);
    }
}
