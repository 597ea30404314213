use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use pera_types::working::{StoredValue, WorkingEntry};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct WorkingStoreStats {
    pub sessions: usize,
    pub entries: usize,
    pub compressed_entries: usize,
}

/// Volatile, per-session, TTL-bounded key-value store (`spec.md` §4.1).
///
/// Implementations never fail on a missing read — `get` returns `Ok(None)`
/// rather than an error — but may fail on write with [`Error::StoreFull`].
#[async_trait]
pub trait WorkingStore: Send + Sync {
    async fn put(&self, session: Uuid, key: &str, value: Value, ttl: Option<Duration>) -> Result<()>;
    async fn get(&self, session: Uuid, key: &str) -> Result<Option<Value>>;
    async fn delete(&self, session: Uuid, key: &str) -> Result<()>;
    async fn list(&self, session: Uuid) -> Result<Vec<String>>;
    async fn clear(&self, session: Uuid) -> Result<()>;
    async fn stats(&self) -> Result<WorkingStoreStats>;
}

struct SessionBucket {
    entries: HashMap<String, WorkingEntry>,
}

/// In-process `WorkingStore`, grounded in the teacher's `StorageBackend`
/// in-memory path: one lock per session so concurrent sessions never
/// contend, with a capacity ceiling and a background sweeper removing
/// expired entries.
pub struct InMemoryWorkingStore {
    sessions: Mutex<HashMap<Uuid, SessionBucket>>,
    max_entries_per_session: usize,
    compression_threshold_bytes: usize,
    default_ttl: Duration,
}

impl InMemoryWorkingStore {
    #[must_use]
    pub fn new(max_entries_per_session: usize, compression_threshold_bytes: usize, default_ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_entries_per_session,
            compression_threshold_bytes,
            default_ttl,
        }
    }

    /// Spawn the background sweeper. Returns the task handle so callers can
    /// abort it on shutdown.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                store.sweep_expired();
            }
        })
    }

    fn sweep_expired(&self) {
        let now = Utc::now();
        let mut sessions = self.sessions.lock();
        let mut removed = 0usize;
        for bucket in sessions.values_mut() {
            let before = bucket.entries.len();
            bucket.entries.retain(|_, entry| !entry.is_expired(now));
            removed += before - bucket.entries.len();
        }
        sessions.retain(|_, bucket| !bucket.entries.is_empty());
        if removed > 0 {
            tracing::debug!(removed, "working store sweeper removed expired entries");
        }
    }
}

#[async_trait]
impl WorkingStore for InMemoryWorkingStore {
    async fn put(&self, session: Uuid, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let stored = StoredValue::pack(&value, self.compression_threshold_bytes)
            .map_err(|e| Error::Backend(e.into()))?;
        let mut sessions = self.sessions.lock();
        let bucket = sessions.entry(session).or_insert_with(|| SessionBucket { entries: HashMap::new() });
        if bucket.entries.len() >= self.max_entries_per_session && !bucket.entries.contains_key(key) {
            return Err(Error::StoreFull);
        }
        bucket.entries.insert(
            key.to_string(),
            WorkingEntry::new(session, key.to_string(), stored, ttl.unwrap_or(self.default_ttl)),
        );
        Ok(())
    }

    async fn get(&self, session: Uuid, key: &str) -> Result<Option<Value>> {
        let now = Utc::now();
        let mut sessions = self.sessions.lock();
        let Some(bucket) = sessions.get_mut(&session) else {
            return Ok(None);
        };
        let Some(entry) = bucket.entries.get_mut(key) else {
            return Ok(None);
        };
        if entry.is_expired(now) {
            bucket.entries.remove(key);
            return Ok(None);
        }
        entry.touch(now);
        entry.value.unpack().map(Some).map_err(Error::Backend)
    }

    async fn delete(&self, session: Uuid, key: &str) -> Result<()> {
        let mut sessions = self.sessions.lock();
        if let Some(bucket) = sessions.get_mut(&session) {
            bucket.entries.remove(key);
        }
        Ok(())
    }

    async fn list(&self, session: Uuid) -> Result<Vec<String>> {
        let sessions = self.sessions.lock();
        Ok(sessions
            .get(&session)
            .map(|bucket| bucket.entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear(&self, session: Uuid) -> Result<()> {
        self.sessions.lock().remove(&session);
        Ok(())
    }

    async fn stats(&self) -> Result<WorkingStoreStats> {
        let sessions = self.sessions.lock();
        let mut entries = 0;
        let mut compressed = 0;
        for bucket in sessions.values() {
            entries += bucket.entries.len();
            compressed += bucket.entries.values().filter(|e| e.value.is_compressed()).count();
        }
        Ok(WorkingStoreStats { sessions: sessions.len(), entries, compressed_entries: compressed })
    }
}
