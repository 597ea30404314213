use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use pera_types::episode::{Episode, GlobalState};
use pera_types::filters::EpisodeFilter;
use pera_types::task::TaskType;
use uuid::Uuid;

use crate::error::Result;

/// Append-only store of Episodes (`spec.md` §4.1), with secondary indexes
/// maintained in parallel by state, tokenized goal terms, session ID, date,
/// and performance band.
#[async_trait]
pub trait EpisodicLog: Send + Sync {
    async fn append_episode(&self, episode: Episode) -> Result<Uuid>;
    async fn get_episode(&self, id: Uuid) -> Result<Option<Episode>>;
    async fn list_episodes(&self, filters: &EpisodeFilter, limit: usize) -> Result<Vec<Episode>>;
    async fn list_by_task_type(&self, task_type: &TaskType, limit: usize) -> Result<Vec<Episode>>;
}

#[derive(Default)]
struct Indexes {
    by_state: HashMap<GlobalState, Vec<Uuid>>,
    by_goal_token: HashMap<String, Vec<Uuid>>,
    by_session: HashMap<Uuid, Vec<Uuid>>,
    by_date: HashMap<chrono::NaiveDate, Vec<Uuid>>,
    by_band: HashMap<&'static str, Vec<Uuid>>,
}

struct Inner {
    episodes: HashMap<Uuid, Episode>,
    indexes: Indexes,
}

/// In-process `EpisodicLog`. Writes are serialized through `append_lock` —
/// the single-writer queue the data model's shared-resource rule calls
/// for — while reads take only the inner `RwLock`'s read guard and so never
/// block on each other or on a concurrently in-flight append's validation.
pub struct InMemoryEpisodicLog {
    inner: RwLock<Inner>,
    append_lock: tokio::sync::Mutex<()>,
}

impl InMemoryEpisodicLog {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner { episodes: HashMap::new(), indexes: Indexes::default() }),
            append_lock: tokio::sync::Mutex::new(()),
        }
    }
}

impl Default for InMemoryEpisodicLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EpisodicLog for InMemoryEpisodicLog {
    async fn append_episode(&self, episode: Episode) -> Result<Uuid> {
        episode.verify_checksum()?;
        episode.verify_temporal_consistency()?;

        let _guard = self.append_lock.lock().await;
        let id = episode.id;
        let mut inner = self.inner.write();

        inner.indexes.by_state.entry(episode.global_state).or_default().push(id);
        for token in episode.goal_tokens() {
            inner.indexes.by_goal_token.entry(token).or_default().push(id);
        }
        inner.indexes.by_session.entry(episode.session_id).or_default().push(id);
        inner.indexes.by_date.entry(episode.start.date_naive()).or_default().push(id);
        let band = GlobalState::performance_band(episode.metrics.success_ratio);
        inner.indexes.by_band.entry(band).or_default().push(id);

        inner.episodes.insert(id, episode);
        Ok(id)
    }

    async fn get_episode(&self, id: Uuid) -> Result<Option<Episode>> {
        Ok(self.inner.read().episodes.get(&id).cloned())
    }

    async fn list_episodes(&self, filters: &EpisodeFilter, limit: usize) -> Result<Vec<Episode>> {
        let inner = self.inner.read();

        // Intersect posting lists for any indexed criteria present, falling
        // back to a full scan when none apply.
        let mut candidate: Option<std::collections::HashSet<Uuid>> = None;
        let mut narrow = |ids: &[Uuid]| {
            let set: std::collections::HashSet<Uuid> = ids.iter().copied().collect();
            candidate = Some(match candidate.take() {
                Some(existing) => existing.intersection(&set).copied().collect(),
                None => set,
            });
        };

        if let Some(state) = filters.state {
            narrow(inner.indexes.by_state.get(&state).map_or(&[][..], Vec::as_slice));
        }
        if let Some(session_id) = filters.session_id {
            narrow(inner.indexes.by_session.get(&session_id).map_or(&[][..], Vec::as_slice));
        }
        if let Some(band) = &filters.performance_band {
            narrow(inner.indexes.by_band.get(band.as_str()).map_or(&[][..], Vec::as_slice));
        }

        let mut results: Vec<Episode> = match candidate {
            Some(ids) => ids.into_iter().filter_map(|id| inner.episodes.get(&id).cloned()).collect(),
            None => inner.episodes.values().cloned().collect(),
        };

        if let Some(since) = filters.since {
            results.retain(|e| e.start >= since);
        }
        if let Some(until) = filters.until {
            results.retain(|e| e.start <= until);
        }
        if let Some(term) = &filters.goal_contains {
            let term = term.to_lowercase();
            results.retain(|e| e.goal.to_lowercase().contains(&term));
        }

        results.sort_by(|a, b| b.start.cmp(&a.start));
        results.truncate(limit);
        Ok(results)
    }

    async fn list_by_task_type(&self, task_type: &TaskType, limit: usize) -> Result<Vec<Episode>> {
        let inner = self.inner.read();
        let mut results: Vec<Episode> = inner
            .episodes
            .values()
            .filter(|e| e.plan.tasks.iter().any(|t| &t.task_type == task_type))
            .cloned()
            .collect();
        results.sort_by(|a, b| b.start.cmp(&a.start));
        results.truncate(limit);
        Ok(results)
    }
}
