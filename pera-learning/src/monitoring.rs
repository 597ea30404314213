//! Impact monitoring (`spec.md` §4.6 step 8): after a preference switch is
//! applied, compare the tool's composite score in the window before the
//! change to the window after, and flag a regression if performance
//! dropped rather than improved.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use pera_memory::EpisodicLog;
use pera_types::filters::EpisodeFilter;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::features;
use crate::tool_performance::composite_score;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactReport {
    pub task_type: String,
    pub tool: String,
    pub before_score: f32,
    pub after_score: f32,
    pub regressed: bool,
}

/// A preference switch pending its impact check, applied at `applied_at`
/// and due for comparison once `applied_at + window` has elapsed.
#[derive(Debug, Clone)]
pub struct PendingChange {
    pub task_type: String,
    pub tool: String,
    pub applied_at: DateTime<Utc>,
}

async fn window_composite_score(
    episodic: &Arc<dyn EpisodicLog>,
    tool: &str,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<f32> {
    let filter = EpisodeFilter { since: Some(since), until: Some(until), ..Default::default() };
    let episodes = episodic.list_episodes(&filter, 10_000).await?;
    let rows: Vec<_> = episodes.iter().map(features::extract).collect();
    let durations: Vec<f32> = rows
        .iter()
        .filter(|f| f.tool_usage.contains_key(tool))
        .map(|f| f.duration_secs)
        .collect();
    let successes: Vec<bool> = rows.iter().filter(|f| f.tool_usage.contains_key(tool)).map(|f| f.succeeded).collect();
    if durations.is_empty() {
        return Ok(0.0);
    }
    let success_rate = successes.iter().filter(|&&s| s).count() as f32 / successes.len() as f32;
    let mean_duration = durations.iter().sum::<f32>() / durations.len() as f32;
    Ok(composite_score(success_rate, mean_duration))
}

/// Compare `tool`'s composite score in the `window` before and after
/// `pending.applied_at`, flagging a regression if the after-score dropped
/// by more than a small tolerance rather than holding or improving.
pub async fn check_impact(
    episodic: &Arc<dyn EpisodicLog>,
    pending: &PendingChange,
    window: Duration,
) -> Result<ImpactReport> {
    const REGRESSION_TOLERANCE: f32 = 0.05;

    let before_score =
        window_composite_score(episodic, &pending.tool, pending.applied_at - window, pending.applied_at).await?;
    let after_score =
        window_composite_score(episodic, &pending.tool, pending.applied_at, pending.applied_at + window).await?;

    Ok(ImpactReport {
        task_type: pending.task_type.clone(),
        tool: pending.tool.clone(),
        before_score,
        after_score,
        regressed: after_score < before_score - REGRESSION_TOLERANCE,
    })
}
