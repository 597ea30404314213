use std::collections::HashMap;

use pera_types::episode::Episode;
use serde::{Deserialize, Serialize};

/// One `(task_type, tool)` pair's aggregate duration samples, pending
/// composite scoring.
#[derive(Debug, Clone, Default)]
struct ToolSamples {
    successes: u32,
    total: u32,
    durations: Vec<f32>,
}

impl ToolSamples {
    fn success_rate(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.successes as f32 / self.total as f32
        }
    }

    fn mean_duration(&self) -> f32 {
        if self.durations.is_empty() {
            0.0
        } else {
            self.durations.iter().sum::<f32>() / self.durations.len() as f32
        }
    }
}

/// Welch's t-test statistic and degrees of freedom comparing two
/// independent samples' mean duration, plus a large-sample 95%-confidence
/// significance call (`spec.md` §5 "Welch's t-test" implementation note).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TTestResult {
    pub t_statistic: f32,
    pub degrees_of_freedom: f32,
    pub significant_95: bool,
}

fn mean_variance(samples: &[f32]) -> (f32, f32) {
    let n = samples.len() as f32;
    let mean = samples.iter().sum::<f32>() / n;
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / (n - 1.0).max(1.0);
    (mean, variance)
}

/// Two-sided Welch's t-test; a `|t| > 1.96` threshold approximates the
/// 95% critical value for the moderate-to-large sample sizes a learning
/// cycle's window realistically produces (no tabulated-t-distribution
/// dependency in the teacher's stack, so this is the same normal-theory
/// approximation the teacher's `reward.rs` uses for its own thresholds).
#[must_use]
pub fn welch_t_test(a: &[f32], b: &[f32]) -> Option<TTestResult> {
    if a.len() < 2 || b.len() < 2 {
        return None;
    }
    let (mean_a, var_a) = mean_variance(a);
    let (mean_b, var_b) = mean_variance(b);
    let na = a.len() as f32;
    let nb = b.len() as f32;
    let se_sq = var_a / na + var_b / nb;
    if se_sq <= 0.0 {
        return Some(TTestResult { t_statistic: 0.0, degrees_of_freedom: na + nb - 2.0, significant_95: false });
    }
    let se = se_sq.sqrt();
    let t = (mean_a - mean_b) / se;
    let df = se_sq.powi(2) / ((var_a / na).powi(2) / (na - 1.0) + (var_b / nb).powi(2) / (nb - 1.0));
    Some(TTestResult { t_statistic: t, degrees_of_freedom: df, significant_95: t.abs() > 1.96 })
}

/// Composite score per `spec.md` §4.6 step 2:
/// `0.6 * success_rate + 0.4 / ln(1 + mean_duration)`.
#[must_use]
pub fn composite_score(success_rate: f32, mean_duration_secs: f32) -> f32 {
    0.6 * success_rate + 0.4 / (1.0 + mean_duration_secs.max(0.0)).ln().max(0.001)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStatSummary {
    pub tool: String,
    pub success_rate: f32,
    pub mean_duration_secs: f32,
    pub composite_score: f32,
    pub sample_count: u32,
}

/// Ranked tool candidates for one task-type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTypeReport {
    pub task_type: String,
    pub ranked: Vec<ToolStatSummary>,
    pub best_tool: Option<String>,
    pub top_two_significance: Option<TTestResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolPerformanceReport {
    pub by_task_type: Vec<TaskTypeReport>,
}

/// Aggregate each `(task_type, tool)` pair's usage across a batch of
/// episodes into ranked, composite-scored summaries per task-type, and
/// Welch's-t-test the top two candidates within a task-type when both
/// have at least 10 samples (`spec.md` §4.6 step 2).
#[must_use]
pub fn analyze(episodes: &[Episode]) -> ToolPerformanceReport {
    let mut per_key: HashMap<(String, String), ToolSamples> = HashMap::new();

    for episode in episodes {
        for result in &episode.task_results {
            let Some(tool) = &result.tool_used else { continue };
            let Some(task) = episode.plan.tasks.iter().find(|t| t.id == result.task_id) else { continue };
            let key = (task.task_type.as_str().to_string(), tool.clone());
            let entry = per_key.entry(key).or_default();
            entry.total += 1;
            if result.success {
                entry.successes += 1;
            }
            entry.durations.push(result.duration.as_secs_f32());
        }
    }

    let mut by_task_type_samples: HashMap<String, Vec<(String, ToolSamples)>> = HashMap::new();
    for ((task_type, tool), samples) in per_key {
        by_task_type_samples.entry(task_type).or_default().push((tool, samples));
    }

    let mut by_task_type: Vec<TaskTypeReport> = by_task_type_samples
        .into_iter()
        .map(|(task_type, tool_samples)| {
            let mut ranked: Vec<ToolStatSummary> = tool_samples
                .iter()
                .map(|(tool, samples)| ToolStatSummary {
                    tool: tool.clone(),
                    success_rate: samples.success_rate(),
                    mean_duration_secs: samples.mean_duration(),
                    composite_score: composite_score(samples.success_rate(), samples.mean_duration()),
                    sample_count: samples.total,
                })
                .collect();
            ranked.sort_by(|a, b| b.composite_score.total_cmp(&a.composite_score));

            let top_two_significance = if ranked.len() >= 2 {
                let a = tool_samples.iter().find(|(t, _)| *t == ranked[0].tool).map(|(_, s)| s.durations.as_slice());
                let b = tool_samples.iter().find(|(t, _)| *t == ranked[1].tool).map(|(_, s)| s.durations.as_slice());
                match (a, b) {
                    (Some(a), Some(b)) if a.len() >= 10 && b.len() >= 10 => welch_t_test(a, b),
                    _ => None,
                }
            } else {
                None
            };

            let best_tool = ranked.first().map(|s| s.tool.clone());
            TaskTypeReport { task_type, ranked, best_tool, top_two_significance }
        })
        .collect();
    by_task_type.sort_by(|a, b| a.task_type.cmp(&b.task_type));

    ToolPerformanceReport { by_task_type }
}
