use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use pera_memory::{EpisodicLog, KnowledgeStore};
use pera_messaging::{CorrelationId, EventBus, EventEnvelope, EventType, Severity};
use pera_orchestrator::LearningScheduler;
use pera_types::config::LearningConfig;
use pera_types::episode::GlobalState;
use pera_types::filters::EpisodeFilter;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::abstraction::{self, ProcedureCandidate};
use crate::error::Result;
use crate::factors::{self, FactorImportance};
use crate::features::{self, EpisodeFeatures};
use crate::integration;
use crate::monitoring::{self, ImpactReport, PendingChange};
use crate::patterns;
use crate::tool_performance::{self, ToolPerformanceReport};

/// Outcome of one learning-loop pass over a window of episodes
/// (`spec.md` §4.6's 8-step pipeline).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningCycleReport {
    pub episodes_considered: usize,
    pub tool_performance: Option<ToolPerformanceReport>,
    pub pattern_clusters: usize,
    pub pattern_noise: usize,
    pub factors: Vec<FactorImportance>,
    pub candidates_accepted: usize,
    pub skills_integrated: usize,
    pub preferences_applied: usize,
    pub impact_reports: Vec<ImpactReport>,
    /// Failure-isolated analysis errors: one stage erroring never aborts
    /// the rest of the cycle (`spec.md` §4.6 "parallel analyses" note).
    pub errors: Vec<String>,
}

/// Drives the batch learning loop (`spec.md` §4.6), both periodically and
/// in response to the orchestrator's per-episode scheduling. Cheap to
/// clone: every field is an `Arc`, so [`LearningScheduler::schedule`] can
/// hand a clone into a detached task.
#[derive(Clone)]
pub struct LearningLoop {
    episodic: Arc<dyn EpisodicLog>,
    knowledge: Arc<dyn KnowledgeStore>,
    bus: Arc<EventBus>,
    config: LearningConfig,
    write_lock: Arc<tokio::sync::Mutex<()>>,
    pending_changes: Arc<tokio::sync::Mutex<Vec<PendingChange>>>,
}

impl LearningLoop {
    #[must_use]
    pub fn new(
        episodic: Arc<dyn EpisodicLog>,
        knowledge: Arc<dyn KnowledgeStore>,
        bus: Arc<EventBus>,
        config: LearningConfig,
    ) -> Self {
        Self {
            episodic,
            knowledge,
            bus,
            config,
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
            pending_changes: Arc::new(tokio::sync::Mutex::new(Vec::new())),
        }
    }

    /// Process the window of episodes since `since` through all 8 steps.
    /// Both the per-episode trigger and the periodic cycle call this over
    /// the same rolling window; the triggering episode ID only decides
    /// *when* to run, not what's in scope (`spec.md` §4.6's "window of
    /// recent episodes" framing).
    pub async fn run_window(&self, since: DateTime<Utc>) -> Result<LearningCycleReport> {
        let episodes =
            self.episodic.list_episodes(&EpisodeFilter { since: Some(since), ..Default::default() }, 10_000).await?;
        let mut report = LearningCycleReport { episodes_considered: episodes.len(), ..Default::default() };
        if episodes.is_empty() {
            return Ok(report);
        }

        let feature_rows: Vec<EpisodeFeatures> = episodes.iter().map(features::extract).collect();
        let episodes = Arc::new(episodes);
        let feature_rows = Arc::new(feature_rows);

        // Step 2/3: three independent analyses, fanned out onto blocking
        // threads (pattern detection's DBSCAN pass is the one genuinely
        // CPU-heavy piece) and failure-isolated from each other.
        let tool_perf_handle = {
            let episodes = Arc::clone(&episodes);
            tokio::task::spawn_blocking(move || tool_performance::analyze(&episodes))
        };
        let patterns_handle = {
            let episodes = Arc::clone(&episodes);
            let feature_rows = Arc::clone(&feature_rows);
            let success_threshold = self.config.success_fraction_threshold;
            let eps = self.config.dbscan_eps;
            let min_samples = self.config.dbscan_min_samples;
            tokio::task::spawn_blocking(move || {
                patterns::detect(&episodes, &feature_rows, success_threshold, Some(eps), min_samples)
            })
        };
        let factors_handle = {
            let feature_rows = Arc::clone(&feature_rows);
            let seed = since.timestamp().unsigned_abs();
            tokio::task::spawn_blocking(move || factors::analyze(&feature_rows, seed))
        };

        let (tool_perf_result, patterns_result, factors_result) =
            tokio::join!(tool_perf_handle, patterns_handle, factors_handle);

        match tool_perf_result {
            Ok(r) => report.tool_performance = Some(r),
            Err(err) => report.errors.push(format!("tool_performance: {err}")),
        }
        match patterns_result {
            Ok(r) => {
                report.pattern_clusters = r.clusters.len();
                report.pattern_noise = r.noise_count;
            }
            Err(err) => report.errors.push(format!("patterns: {err}")),
        }
        match factors_result {
            Ok(r) => report.factors = r,
            Err(err) => report.errors.push(format!("factors: {err}")),
        }

        // Step 4: procedure abstraction over successful episodes only.
        let successful: Vec<(&pera_types::episode::Episode, &EpisodeFeatures)> = episodes
            .iter()
            .zip(feature_rows.iter())
            .filter(|(e, _)| e.global_state == GlobalState::Success)
            .collect();
        let successful_episodes: Vec<&pera_types::episode::Episode> = successful.iter().map(|(e, _)| *e).collect();
        let successful_features: Vec<&EpisodeFeatures> = successful.iter().map(|(_, f)| *f).collect();
        let candidates: Vec<ProcedureCandidate> = abstraction::abstract_procedures(
            &successful_episodes,
            &successful_features,
            self.config.min_episodes_per_group,
            self.config.quality_threshold,
        );
        report.candidates_accepted = candidates.len();

        // Step 6: integrate, serialized by the write lock.
        {
            let _guard = self.write_lock.lock().await;
            for candidate in &candidates {
                match integration::integrate_candidate(&self.knowledge, candidate).await {
                    Ok(_) => {
                        report.skills_integrated += 1;
                        self.bus.publish(EventEnvelope::new(
                            EventType::SkillUpdated,
                            Severity::Info,
                            "pera-learning",
                            CorrelationId::new(),
                            serde_json::json!({"name": candidate.name, "quality": candidate.quality}),
                        ));
                    }
                    Err(err) => report.errors.push(format!("integration[{}]: {err}", candidate.name)),
                }
            }

            // Step 7: preference updates, per task-type tool-performance
            // report.
            if let Some(tool_report) = &report.tool_performance {
                for per_task_type in &tool_report.by_task_type {
                    match integration::apply_preference_update(
                        &self.knowledge,
                        per_task_type,
                        self.config.improvement_threshold,
                    )
                    .await
                    {
                        Ok(true) => {
                            report.preferences_applied += 1;
                            if let Some(tool) = &per_task_type.best_tool {
                                self.pending_changes.lock().await.push(PendingChange {
                                    task_type: per_task_type.task_type.clone(),
                                    tool: tool.clone(),
                                    applied_at: Utc::now(),
                                });
                            }
                        }
                        Ok(false) => {}
                        Err(err) => report.errors.push(format!("preference[{}]: {err}", per_task_type.task_type)),
                    }
                }
            }
        }

        // Step 8: sweep any preference switch whose impact window has
        // fully elapsed (applied at least two windows ago, so both the
        // before and after windows are populated). Uses a window fixed at
        // `impact_monitoring_window_hours`, independent of `window_hours`
        // (`spec.md` line 170's `[T-7d, T]`/`[T, T+7d]`).
        let impact_window = Duration::hours(self.config.impact_monitoring_window_hours.max(1));
        let due_cutoff = Utc::now() - impact_window * 2;
        let due: Vec<PendingChange> = {
            let mut pending = self.pending_changes.lock().await;
            let (due, still_pending): (Vec<_>, Vec<_>) =
                pending.drain(..).partition(|c| c.applied_at <= due_cutoff);
            *pending = still_pending;
            due
        };
        for change in due {
            match monitoring::check_impact(&self.episodic, &change, impact_window).await {
                Ok(impact) => {
                    if impact.regressed {
                        self.bus.publish(EventEnvelope::new(
                            EventType::PerformanceAlert,
                            Severity::Warning,
                            "pera-learning",
                            CorrelationId::new(),
                            serde_json::to_value(&impact).unwrap_or_default(),
                        ));
                    }
                    report.impact_reports.push(impact);
                }
                Err(err) => report.errors.push(format!("impact_monitor[{}]: {err}", change.task_type)),
            }
        }

        Ok(report)
    }

    /// Run over the configured default window, ending at `now`.
    pub async fn run_default_window(&self) -> Result<LearningCycleReport> {
        self.run_window(Utc::now() - Duration::hours(self.config.window_hours.max(1))).await
    }
}

impl LearningScheduler for LearningLoop {
    /// Fire-and-forget per-episode trigger (`spec.md` §4.5 step 6): runs
    /// the same windowed pipeline as the periodic cycle; the episode ID
    /// only decides that *now* is a good time to look, the window still
    /// covers everything recent.
    fn schedule(&self, episode_id: Uuid) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(err) = this.run_default_window().await {
                tracing::warn!(%episode_id, %err, "learning cycle triggered by episode failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pera_memory::{EmbeddingProvider, HashingEmbeddingProvider, InMemoryEpisodicLog, InMemoryKnowledgeStore};
    use pera_types::episode::Episode;
    use pera_types::plan::{Plan, PlanMetadata};
    use pera_types::task::{Task, TaskResult, TaskType};
    use std::collections::HashMap as Map;

    fn episode() -> Episode {
        let start = Utc::now();
        let end = start + Duration::seconds(5);
        let task = Task::new("t1", "search the web", TaskType::Search);
        let result = TaskResult::success(task.id.clone(), serde_json::json!(null), "web_search", start, end, 0);
        let plan = Plan::new("find weather", vec![task], PlanMetadata::generated(0.9));
        Episode::new(
            "find weather".to_string(),
            Uuid::new_v4(),
            plan,
            vec![result],
            GlobalState::Success,
            Map::new(),
            start,
            end,
            "0.1.0".to_string(),
        )
    }

    async fn loop_with_episodes(count: usize) -> (LearningLoop, Arc<InMemoryEpisodicLog>) {
        let episodic = Arc::new(InMemoryEpisodicLog::new());
        for _ in 0..count {
            episodic.append_episode(episode()).await.unwrap();
        }
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbeddingProvider::new(64));
        let knowledge: Arc<dyn KnowledgeStore> = Arc::new(InMemoryKnowledgeStore::new(embedder, 0.1));
        let bus = Arc::new(EventBus::new());
        let looper = LearningLoop::new(
            Arc::clone(&episodic) as Arc<dyn EpisodicLog>,
            knowledge,
            bus,
            LearningConfig::default(),
        );
        (looper, episodic)
    }

    #[tokio::test]
    async fn empty_window_is_a_no_op() {
        let (looper, _episodic) = loop_with_episodes(0).await;
        let report = looper.run_window(Utc::now() - Duration::hours(1)).await.unwrap();
        assert_eq!(report.episodes_considered, 0);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn a_sizable_batch_of_similar_episodes_yields_an_integrated_skill() {
        let (looper, _episodic) = loop_with_episodes(5).await;
        let report = looper.run_window(Utc::now() - Duration::hours(1)).await.unwrap();
        assert_eq!(report.episodes_considered, 5);
        assert!(report.candidates_accepted >= 1);
        assert_eq!(report.skills_integrated, report.candidates_accepted);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn scheduling_triggers_a_background_cycle() {
        let (looper, episodic) = loop_with_episodes(5).await;
        let episode_id = episodic.list_episodes(&Default::default(), 1).await.unwrap()[0].id;
        looper.schedule(episode_id);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}
