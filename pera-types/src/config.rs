use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff shape for the execution engine's retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryBackoff {
    None,
    Linear,
    #[default]
    Exponential,
    Fibonacci,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkingMemoryConfig {
    pub timeout_secs: u64,
    pub compression_threshold_bytes: usize,
    pub sweep_interval_secs: u64,
}

impl Default for WorkingMemoryConfig {
    fn default() -> Self {
        Self { timeout_secs: 3600, compression_threshold_bytes: 4096, sweep_interval_secs: 60 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodicMemoryConfig {
    pub uri: String,
}

impl Default for EpisodicMemoryConfig {
    fn default() -> Self {
        Self { uri: "sqlite://episodes.db".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeMemoryConfig {
    pub path: String,
    pub similarity_threshold: f32,
    pub optimizer_interval_secs: u64,
    pub stale_skill_max_age_days: i64,
}

impl Default for KnowledgeMemoryConfig {
    fn default() -> Self {
        Self {
            path: "knowledge.redb".to_string(),
            similarity_threshold: 0.7,
            optimizer_interval_secs: 86_400,
            stale_skill_max_age_days: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub working: WorkingMemoryConfig,
    pub episodic: EpisodicMemoryConfig,
    pub knowledge: KnowledgeMemoryConfig,
    pub ewma_alpha: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            working: WorkingMemoryConfig::default(),
            episodic: EpisodicMemoryConfig::default(),
            knowledge: KnowledgeMemoryConfig::default(),
            ewma_alpha: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub default_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_secs: u64,
    pub retry_backoff: RetryBackoff,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_secs: 2,
            retry_backoff: RetryBackoff::Exponential,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    pub similarity_threshold: f32,
    pub skill_confidence_threshold: f32,
    pub cache_capacity: usize,
    pub max_replan_attempts: u32,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            skill_confidence_threshold: 0.8,
            cache_capacity: 256,
            max_replan_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub cycle_interval_secs: u64,
    pub window_hours: i64,
    pub min_episodes_per_group: usize,
    pub quality_threshold: f32,
    pub improvement_threshold: f32,
    pub success_fraction_threshold: f32,
    pub dbscan_eps: f32,
    pub dbscan_min_samples: usize,
    /// Width of the before/after comparison window step 8's impact
    /// monitoring uses (`spec.md` line 170: `[T-7d, T]` and `[T, T+7d]`).
    /// Fixed independently of `window_hours`, which only sizes the
    /// episode-loading window steps 1-7 analyze.
    pub impact_monitoring_window_hours: i64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 3600,
            window_hours: 24,
            min_episodes_per_group: 3,
            quality_threshold: 0.6,
            improvement_threshold: 0.1,
            success_fraction_threshold: 0.7,
            dbscan_eps: 0.3,
            dbscan_min_samples: 3,
            impact_monitoring_window_hours: 24 * 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub latency_warn_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self { latency_warn_secs: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub per_session_concurrency_cap: usize,
    pub global_worker_count: usize,
    pub success_ratio_threshold: f32,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            per_session_concurrency_cap: 8,
            global_worker_count: 16,
            success_ratio_threshold: 0.7,
        }
    }
}

/// Root configuration object threaded explicitly through constructors
/// rather than read from a process-global, per the "no process-global
/// mutable state" design note.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PeraConfig {
    pub memory: MemoryConfig,
    pub execution: ExecutionConfig,
    pub planning: PlanningConfig,
    pub learning: LearningConfig,
    pub monitoring: MonitoringConfig,
    pub concurrency: ConcurrencyConfig,
}

impl PeraConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// any key the file omits.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not parse as
    /// valid TOML matching this shape.
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.execution.default_timeout_secs)
    }
}
