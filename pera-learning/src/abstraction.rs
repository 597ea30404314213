//! Procedure abstraction (`spec.md` §4.6 step 4): group successful
//! episodes that share a coarse structural signature, then score each
//! group's candidate procedure on coverage, consistency, generality,
//! predictive utility, and precision, accepting it as a skill candidate
//! only once the weighted composite clears `quality_threshold`.

use std::collections::HashMap;

use pera_types::episode::Episode;
use pera_types::skill::SkillStep;
use uuid::Uuid;

use crate::features::EpisodeFeatures;

fn discretize_duration(secs: f32) -> &'static str {
    if secs < 30.0 {
        "fast"
    } else if secs < 120.0 {
        "medium"
    } else {
        "slow"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StructuralKey {
    task_count: usize,
    task_types: Vec<String>,
    duration_band: &'static str,
}

fn structural_key(episode: &Episode) -> StructuralKey {
    let mut task_types: Vec<String> = episode.plan.tasks.iter().map(|t| t.task_type.as_str().to_string()).collect();
    task_types.sort();
    StructuralKey {
        task_count: episode.plan.tasks.len(),
        task_types,
        duration_band: discretize_duration(episode.total_duration.as_secs_f32()),
    }
}

/// A candidate procedure derived from a group of structurally similar
/// episodes, not yet committed to the Knowledge Store.
#[derive(Debug, Clone)]
pub struct ProcedureCandidate {
    pub name: String,
    pub objective: String,
    pub steps: Vec<SkillStep>,
    pub source_episode_ids: Vec<Uuid>,
    pub quality: f32,
}

struct QualityWeights {
    coverage: f32,
    consistency: f32,
    generality: f32,
    predictive_utility: f32,
    precision: f32,
}

const WEIGHTS: QualityWeights =
    QualityWeights { coverage: 0.3, consistency: 0.25, generality: 0.2, predictive_utility: 0.15, precision: 0.1 };

fn quality_score(group: &[&Episode], group_features: &[&EpisodeFeatures], total_successful: usize) -> f32 {
    let n = group.len() as f32;

    let coverage = (group.len() as f32 / total_successful.max(1) as f32).min(1.0);

    let durations: Vec<f32> = group.iter().map(|e| e.total_duration.as_secs_f32()).collect();
    let mean_duration = durations.iter().sum::<f32>() / n;
    let variance = durations.iter().map(|d| (d - mean_duration).powi(2)).sum::<f32>() / n;
    let normalized_variance = if mean_duration > 0.0 { variance / mean_duration.powi(2) } else { 0.0 };
    let consistency = (1.0 - normalized_variance).clamp(0.0, 1.0);

    let generality = ((1.0 + n).ln() / 11.0_f32.ln()).min(1.0);

    let predictive_utility =
        group_features.iter().map(|f| f.success_rate).sum::<f32>() / group_features.len() as f32;

    let task_counts: Vec<f32> = group.iter().map(|e| e.plan.tasks.len() as f32).collect();
    let mean_count = task_counts.iter().sum::<f32>() / n;
    let count_variance = task_counts.iter().map(|c| (c - mean_count).powi(2)).sum::<f32>() / n;
    let precision = if mean_count > 0.0 { (1.0 - count_variance.sqrt() / mean_count).clamp(0.0, 1.0) } else { 0.0 };

    WEIGHTS.coverage * coverage
        + WEIGHTS.consistency * consistency
        + WEIGHTS.generality * generality
        + WEIGHTS.predictive_utility * predictive_utility
        + WEIGHTS.precision * precision
}

fn to_steps(representative: &Episode, group: &[&Episode]) -> Vec<SkillStep> {
    representative
        .plan
        .tasks
        .iter()
        .enumerate()
        .map(|(idx, task)| {
            // A parameter is generalized (left for the caller to fill in)
            // whenever it varies across the group at this position;
            // constants are carried over as-is.
            let mut parameters = task.parameters.clone();
            for (key, value) in task.parameters.clone() {
                let varies = group.iter().any(|e| {
                    e.plan.tasks.get(idx).is_none_or(|t| t.parameters.get(&key) != Some(&value))
                });
                if varies {
                    parameters.insert(key, serde_json::Value::String(String::new()));
                }
            }
            SkillStep {
                action: task.description.clone(),
                parameters,
                required_tools: match &task.tool {
                    pera_types::task::ToolSelector::Named(name) => vec![name.clone()],
                    pera_types::task::ToolSelector::Auto => vec![],
                },
                preconditions: Vec::new(),
            }
        })
        .collect()
}

/// Group successful episodes by exact structural key, then score each
/// group that meets `min_group_size`, returning only the candidates
/// whose quality clears `quality_threshold`.
#[must_use]
pub fn abstract_procedures(
    episodes: &[&Episode],
    feature_rows: &[&EpisodeFeatures],
    min_group_size: usize,
    quality_threshold: f32,
) -> Vec<ProcedureCandidate> {
    let total_successful = episodes.len();
    let mut groups: HashMap<StructuralKey, Vec<usize>> = HashMap::new();
    for (idx, episode) in episodes.iter().enumerate() {
        groups.entry(structural_key(episode)).or_default().push(idx);
    }

    let mut candidates = Vec::new();
    for (key, indices) in groups {
        if indices.len() < min_group_size {
            continue;
        }
        let group: Vec<&Episode> = indices.iter().map(|&i| episodes[i]).collect();
        let group_features: Vec<&EpisodeFeatures> = indices.iter().map(|&i| feature_rows[i]).collect();
        let quality = quality_score(&group, &group_features, total_successful);
        if quality < quality_threshold {
            continue;
        }

        let representative = group[0];
        let name = format!("procedure-{}-{}", key.task_types.join("-then-"), key.duration_band);
        candidates.push(ProcedureCandidate {
            name,
            objective: representative.goal.clone(),
            steps: to_steps(representative, &group),
            source_episode_ids: group.iter().map(|e| e.id).collect(),
            quality,
        });
    }

    candidates.sort_by(|a, b| b.quality.total_cmp(&a.quality));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features;
    use chrono::Utc;
    use pera_types::episode::GlobalState;
    use pera_types::plan::{Plan, PlanMetadata};
    use pera_types::task::{Task, TaskResult, TaskType};
    use std::collections::HashMap as Map;

    fn episode() -> Episode {
        let start = Utc::now();
        let end = start + chrono::Duration::seconds(10);
        let task = Task::new("t1", "search the web", TaskType::Search).with_param("query", serde_json::json!("weather"));
        let plan = Plan::new("find weather", vec![task.clone()], PlanMetadata::generated(0.9));
        let result = TaskResult::success(task.id.clone(), serde_json::json!(null), "web_search", start, end, 0);
        Episode::new("find weather".to_string(), Uuid::new_v4(), plan, vec![result], GlobalState::Success, Map::new(), start, end, "0.1.0".to_string())
    }

    #[test]
    fn a_group_of_similar_episodes_clears_the_threshold() {
        let episodes: Vec<Episode> = (0..4).map(|_| episode()).collect();
        let feature_rows: Vec<EpisodeFeatures> = episodes.iter().map(features::extract).collect();
        let episode_refs: Vec<&Episode> = episodes.iter().collect();
        let feature_refs: Vec<&EpisodeFeatures> = feature_rows.iter().collect();
        let candidates = abstract_procedures(&episode_refs, &feature_refs, 3, 0.6);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].source_episode_ids.len(), 4);
    }

    #[test]
    fn below_min_group_size_is_dropped() {
        let episodes: Vec<Episode> = (0..2).map(|_| episode()).collect();
        let feature_rows: Vec<EpisodeFeatures> = episodes.iter().map(features::extract).collect();
        let episode_refs: Vec<&Episode> = episodes.iter().collect();
        let feature_refs: Vec<&EpisodeFeatures> = feature_rows.iter().collect();
        assert!(abstract_procedures(&episode_refs, &feature_refs, 3, 0.6).is_empty());
    }
}
