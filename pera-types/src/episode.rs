use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::execution::ExecutionMetadata;
use crate::plan::Plan;
use crate::task::TaskResult;

/// Terminal state of one goal execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalState {
    Success,
    Failure,
    Partial,
    Timeout,
    Canceled,
}

impl GlobalState {
    /// Performance band used by the Episodic Log's secondary index, keyed
    /// on the fraction of tasks that succeeded.
    #[must_use]
    pub fn performance_band(success_ratio: f32) -> &'static str {
        if success_ratio >= 0.8 {
            "excellent"
        } else if success_ratio >= 0.6 {
            "good"
        } else if success_ratio >= 0.4 {
            "fair"
        } else {
            "poor"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct EpisodeMetrics {
    pub success_ratio: f32,
    pub total_retries: u32,
    pub unique_tools: u32,
}

/// Optional human feedback on an episode's outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFeedback {
    pub rating: Option<f32>,
    pub comment: Option<String>,
}

/// Automatic evaluation computed without human input (e.g. from the reward
/// calculation in the learning loop).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoEvaluation {
    pub reward: f32,
}

/// Immutable record of one goal execution.
///
/// Construction and reads are the only supported operations: the episodic
/// log invariant ("append-only, no mutation after write") is enforced by
/// the storage layer, not by this type, but `Episode` itself exposes no
/// setters once `finalize` has produced a record — callers build up an
/// [`EpisodeBuilder`] instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: Uuid,
    pub goal: String,
    pub session_id: Uuid,
    pub plan: Plan,
    pub task_results: Vec<TaskResult>,
    pub global_state: GlobalState,
    pub total_duration: std::time::Duration,
    pub execution_context: HashMap<String, Value>,
    pub metrics: EpisodeMetrics,
    /// Per-task [`ExecutionMetadata`] records appended by EXE as each task
    /// completes (`spec.md` §4.3's "appended to the current Episode under
    /// construction"). Empty for episodes built before this field existed
    /// or for the placeholder episodes `ORC` records on system errors.
    pub task_metadata: Vec<ExecutionMetadata>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub system_version: String,
    pub checksum: String,
    pub user_feedback: Option<UserFeedback>,
    pub automatic_evaluation: Option<AutoEvaluation>,
}

impl Episode {
    /// Canonical bytes hashed into the integrity checksum: goal, start,
    /// end, and system version, per the data model's invariant.
    fn canonical_bytes(goal: &str, start: DateTime<Utc>, end: DateTime<Utc>, version: &str) -> Vec<u8> {
        format!("{goal}|{}|{}|{version}", start.to_rfc3339(), end.to_rfc3339()).into_bytes()
    }

    #[must_use]
    pub fn compute_checksum(goal: &str, start: DateTime<Utc>, end: DateTime<Utc>, version: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(Self::canonical_bytes(goal, start, end, version));
        format!("{:x}", hasher.finalize())
    }

    /// Human-readable episode ID in the `episode_<timestamp>_<hash>` form
    /// named by the data model.
    #[must_use]
    pub fn display_id(&self) -> String {
        format!("episode_{}_{}", self.start.timestamp(), &self.checksum[..12])
    }

    /// Construct and checksum a new episode in one step.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        goal: String,
        session_id: Uuid,
        plan: Plan,
        task_results: Vec<TaskResult>,
        global_state: GlobalState,
        execution_context: HashMap<String, Value>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        system_version: String,
    ) -> Self {
        let checksum = Self::compute_checksum(&goal, start, end, &system_version);
        let total = task_results.len().max(1);
        let successes = task_results.iter().filter(|r| r.success).count();
        let retries: u32 = task_results.iter().map(|r| r.retries).sum();
        let tools: std::collections::HashSet<&str> =
            task_results.iter().filter_map(|r| r.tool_used.as_deref()).collect();

        Self {
            id: Uuid::new_v4(),
            goal,
            session_id,
            plan,
            task_results,
            global_state,
            total_duration: (end - start).to_std().unwrap_or_default(),
            execution_context,
            metrics: EpisodeMetrics {
                success_ratio: successes as f32 / total as f32,
                total_retries: retries,
                unique_tools: tools.len() as u32,
            },
            start,
            end,
            system_version,
            checksum,
            task_metadata: Vec::new(),
            user_feedback: None,
            automatic_evaluation: None,
        }
    }

    /// Attach the per-task execution metadata records gathered while this
    /// episode's plan ran. Separate from `new` since EXE's metadata is only
    /// fully known once every band has executed, while the checksum only
    /// ever covers `(goal, start, end, version)`.
    #[must_use]
    pub fn with_task_metadata(mut self, task_metadata: Vec<ExecutionMetadata>) -> Self {
        self.task_metadata = task_metadata;
        self
    }

    /// Re-derive the checksum and compare, per the integrity validator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChecksumMismatch`] if the stored checksum does not
    /// match the recomputed one.
    pub fn verify_checksum(&self) -> Result<()> {
        let expected = Self::compute_checksum(&self.goal, self.start, self.end, &self.system_version);
        if expected == self.checksum {
            Ok(())
        } else {
            Err(Error::ChecksumMismatch(self.id))
        }
    }

    /// Validate temporal consistency: `end >= start` and the recorded
    /// duration matches `end - start` within the 1-second tolerance the
    /// data model allows.
    pub fn verify_temporal_consistency(&self) -> Result<()> {
        if self.end < self.start {
            return Err(Error::Validation("episode end precedes start".to_string()));
        }
        let actual = (self.end - self.start).to_std().unwrap_or_default();
        let diff = actual.as_secs_f64() - self.total_duration.as_secs_f64();
        if diff.abs() > 1.0 {
            return Err(Error::Validation(format!(
                "episode duration mismatch: recorded {:?}, actual {:?}",
                self.total_duration, actual
            )));
        }
        Ok(())
    }

    /// Tokenized, stopword-stripped goal terms for the Episodic Log's
    /// secondary index.
    #[must_use]
    pub fn goal_tokens(&self) -> Vec<String> {
        const STOPWORDS: &[&str] = &[
            "a", "an", "the", "and", "or", "of", "to", "in", "on", "for", "with", "is", "about",
        ];
        self.goal
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| !w.is_empty() && !STOPWORDS.contains(&w.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanMetadata;
    use chrono::Duration;

    fn sample_episode() -> Episode {
        let start = Utc::now();
        let end = start + Duration::seconds(3);
        Episode::new(
            "Search information about X and write a summary".to_string(),
            Uuid::new_v4(),
            Plan::new("test", vec![], PlanMetadata::generated(0.9)),
            vec![],
            GlobalState::Success,
            HashMap::new(),
            start,
            end,
            "0.1.0".to_string(),
        )
    }

    #[test]
    fn checksum_round_trips() {
        let episode = sample_episode();
        assert!(episode.verify_checksum().is_ok());
    }

    #[test]
    fn tampered_checksum_fails() {
        let mut episode = sample_episode();
        episode.goal = "a different goal entirely".to_string();
        assert!(matches!(episode.verify_checksum(), Err(Error::ChecksumMismatch(_))));
    }

    #[test]
    fn temporal_consistency_holds() {
        let episode = sample_episode();
        assert!(episode.verify_temporal_consistency().is_ok());
    }

    #[test]
    fn end_before_start_is_rejected() {
        let mut episode = sample_episode();
        episode.end = episode.start - Duration::seconds(1);
        assert!(episode.verify_temporal_consistency().is_err());
    }

    #[test]
    fn goal_tokens_strip_stopwords() {
        let episode = sample_episode();
        let tokens = episode.goal_tokens();
        assert!(tokens.contains(&"search".to_string()));
        assert!(!tokens.contains(&"about".to_string()));
        assert!(!tokens.contains(&"and".to_string()));
    }

    #[test]
    fn performance_band_thresholds() {
        assert_eq!(GlobalState::performance_band(0.95), "excellent");
        assert_eq!(GlobalState::performance_band(0.65), "good");
        assert_eq!(GlobalState::performance_band(0.45), "fair");
        assert_eq!(GlobalState::performance_band(0.1), "poor");
    }
}
