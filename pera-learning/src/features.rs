use std::collections::{BTreeSet, HashMap};

use pera_types::episode::Episode;
use uuid::Uuid;

/// Tabular features extracted from one Episode (`spec.md` §4.6 step 2):
/// duration, task count, per-task success rate, unique tool count, and a
/// tool-usage frequency vector keyed by tool name.
#[derive(Debug, Clone)]
pub struct EpisodeFeatures {
    pub episode_id: Uuid,
    pub duration_secs: f32,
    pub task_count: usize,
    pub success_rate: f32,
    pub unique_tools: usize,
    pub tool_usage: HashMap<String, f32>,
    pub total_retries: u32,
    pub succeeded: bool,
}

#[must_use]
pub fn extract(episode: &Episode) -> EpisodeFeatures {
    let task_count = episode.task_results.len().max(1);
    let mut tool_usage: HashMap<String, f32> = HashMap::new();
    for result in &episode.task_results {
        if let Some(tool) = &result.tool_used {
            *tool_usage.entry(tool.clone()).or_insert(0.0) += 1.0;
        }
    }
    for count in tool_usage.values_mut() {
        *count /= task_count as f32;
    }

    EpisodeFeatures {
        episode_id: episode.id,
        duration_secs: episode.total_duration.as_secs_f32(),
        task_count,
        success_rate: episode.metrics.success_ratio,
        unique_tools: episode.metrics.unique_tools as usize,
        tool_usage,
        total_retries: episode.metrics.total_retries,
        succeeded: episode.global_state == pera_types::episode::GlobalState::Success,
    }
}

/// The sorted union of every tool name referenced across a batch, used to
/// give per-episode frequency vectors a consistent dimension before
/// clustering (`spec.md` §4.6 step 3).
#[must_use]
pub fn tool_vocabulary(features: &[EpisodeFeatures]) -> Vec<String> {
    let mut set: BTreeSet<&str> = BTreeSet::new();
    for f in features {
        set.extend(f.tool_usage.keys().map(String::as_str));
    }
    set.into_iter().map(str::to_string).collect()
}

#[must_use]
pub fn tool_frequency_vector(features: &EpisodeFeatures, vocabulary: &[String]) -> Vec<f64> {
    vocabulary.iter().map(|tool| f64::from(features.tool_usage.get(tool).copied().unwrap_or(0.0))).collect()
}
