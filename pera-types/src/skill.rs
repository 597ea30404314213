use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Semantic-version-shaped triple used for [`Skill::version`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SkillVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SkillVersion {
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    #[must_use]
    pub const fn initial() -> Self {
        Self::new(1, 0, 0)
    }

    /// Bump for a parameter/description-only change.
    #[must_use]
    pub fn bump_minor(self) -> Self {
        Self::new(self.major, self.minor + 1, 0)
    }

    /// Bump for a step-sequence change.
    #[must_use]
    pub fn bump_major(self) -> Self {
        Self::new(self.major + 1, 0, 0)
    }
}

impl std::fmt::Display for SkillVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillType {
    Procedure,
    Strategy,
    Template,
    Recipe,
    Adaptation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillAuthor {
    System,
    User,
}

/// A single ordered action within a [`Skill`]'s procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillStep {
    pub action: String,
    pub parameters: HashMap<String, Value>,
    pub required_tools: Vec<String>,
    pub preconditions: Vec<String>,
}

/// Exponentially-weighted moving average success rate and duration metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub success_rate_ewma: f32,
    pub mean_duration_ewma_secs: f32,
}

impl PerformanceMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self { success_rate_ewma: 0.0, mean_duration_ewma_secs: 0.0 }
    }

    /// Fold in one new observation with smoothing factor `alpha`.
    ///
    /// Keeps the monotonic-except-on-reset invariant from the data model:
    /// the update is a strict convex combination, so the result always
    /// lies between the prior value and the new sample.
    pub fn update(&mut self, success: bool, duration_secs: f32, alpha: f32) {
        let sample = if success { 1.0 } else { 0.0 };
        self.success_rate_ewma = alpha * sample + (1.0 - alpha) * self.success_rate_ewma;
        self.mean_duration_ewma_secs =
            alpha * duration_secs + (1.0 - alpha) * self.mean_duration_ewma_secs;
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UsageStats {
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
    pub last_used: Option<DateTime<Utc>>,
}

/// A reusable, versioned procedure stored in the Knowledge Store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub id: Uuid,
    pub name: String,
    pub skill_type: SkillType,
    pub version: SkillVersion,
    pub description: String,
    pub objectives: Vec<String>,
    pub categories: Vec<String>,
    pub steps: Vec<SkillStep>,
    pub preconditions: Vec<String>,
    pub postconditions: Vec<String>,
    pub performance: PerformanceMetrics,
    pub usage: UsageStats,
    pub related_skills: Vec<Uuid>,
    pub dependencies: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: SkillAuthor,
    pub estimated_timeout: Option<std::time::Duration>,
    pub resource_estimates: HashMap<String, Value>,
    pub embedding: Option<Vec<f32>>,
}

impl Skill {
    /// Content-hashed ID derived from name + description + step actions, so
    /// identical skills from different sources collapse to the same ID.
    #[must_use]
    pub fn content_hash_id(name: &str, description: &str, steps: &[SkillStep]) -> Uuid {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        hasher.update(description.as_bytes());
        for step in steps {
            hasher.update(step.action.as_bytes());
        }
        let digest = hasher.finalize();
        Uuid::from_slice(&digest[..16]).unwrap_or_else(|_| Uuid::new_v4())
    }

    /// Text used to derive the skill's embedding: name + description +
    /// objectives, per the Knowledge Store's semantic-search contract.
    #[must_use]
    pub fn embedding_text(&self) -> String {
        format!("{} {} {}", self.name, self.description, self.objectives.join(" "))
    }

    #[must_use]
    pub fn success_rate(&self) -> f32 {
        if self.usage.total == 0 {
            0.0
        } else {
            self.usage.successes as f32 / self.usage.total as f32
        }
    }

    /// Record one use and fold the outcome into the EWMA metrics.
    pub fn record_use(&mut self, success: bool, duration_secs: f32, alpha: f32) {
        self.usage.total += 1;
        if success {
            self.usage.successes += 1;
        } else {
            self.usage.failures += 1;
        }
        self.usage.last_used = Some(Utc::now());
        self.performance.update(success, duration_secs, alpha);
    }

    /// Whether this skill has gone unused long enough to be soft-deleted
    /// (90-day default per the data model's lifecycle rules).
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, max_age_days: i64) -> bool {
        let reference = self.usage.last_used.unwrap_or(self.created_at);
        (now - reference).num_days() >= max_age_days
    }
}

/// The chosen tool and its historical metrics for one task-type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preference {
    pub task_type: String,
    pub tool: String,
    pub success_rate: f32,
    pub mean_duration_secs: f32,
    pub variance: f32,
    pub sample_count: u64,
    pub last_used: DateTime<Utc>,
}

impl Preference {
    #[must_use]
    pub fn new(task_type: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            tool: tool.into(),
            success_rate: 0.0,
            mean_duration_secs: 0.0,
            variance: 0.0,
            sample_count: 0,
            last_used: Utc::now(),
        }
    }

    /// Welford-style incremental update of mean duration and variance plus
    /// a running success-rate average, folding in one new sample.
    pub fn record_sample(&mut self, success: bool, duration_secs: f32) {
        let n = self.sample_count + 1;
        let delta = duration_secs - self.mean_duration_secs;
        self.mean_duration_secs += delta / n as f32;
        let delta2 = duration_secs - self.mean_duration_secs;
        self.variance = if n > 1 {
            ((self.variance * (self.sample_count as f32)) + delta * delta2) / n as f32
        } else {
            0.0
        };
        let success_val = if success { 1.0 } else { 0.0 };
        self.success_rate += (success_val - self.success_rate) / n as f32;
        self.sample_count = n;
        self.last_used = Utc::now();
    }

    /// Composite score per the learning loop's tool-ranking formula:
    /// `0.6 * success + 0.4 * 1/log(1+duration)`.
    #[must_use]
    pub fn composite_score(&self) -> f32 {
        let duration = self.mean_duration_secs.max(0.001);
        0.6 * self.success_rate + 0.4 * (1.0 / (1.0 + duration).ln().max(0.001))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_deterministic() {
        let steps = vec![SkillStep {
            action: "search".to_string(),
            parameters: HashMap::new(),
            required_tools: vec![],
            preconditions: vec![],
        }];
        let a = Skill::content_hash_id("find-info", "finds information", &steps);
        let b = Skill::content_hash_id("find-info", "finds information", &steps);
        assert_eq!(a, b);
    }

    #[test]
    fn ewma_stays_in_unit_interval() {
        let mut metrics = PerformanceMetrics::new();
        for _ in 0..50 {
            metrics.update(true, 1.0, 0.2);
        }
        assert!(metrics.success_rate_ewma <= 1.0 && metrics.success_rate_ewma >= 0.0);
        assert!((metrics.success_rate_ewma - 1.0).abs() < 0.01);
    }

    #[test]
    fn preference_composite_favors_higher_success() {
        let mut a = Preference::new("search", "tool-a");
        let mut b = Preference::new("search", "tool-b");
        for _ in 0..50 {
            a.record_sample(true, 1.0);
        }
        for _ in 0..35 {
            b.record_sample(true, 0.8);
        }
        for _ in 0..15 {
            b.record_sample(false, 0.8);
        }
        assert!(a.composite_score() > b.composite_score());
    }
}
