use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Coarse task categories the planner and registry reason about.
///
/// `Custom` covers task-types the spec enumerates with a trailing
/// "…" (search, generate, analyze, call, …) that a deployment may add
/// without a crate release.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Search,
    Generate,
    Analyze,
    Call,
    Summarize,
    Custom(String),
}

impl TaskType {
    /// Stable string key used for preference/registry lookups.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            TaskType::Search => "search",
            TaskType::Generate => "generate",
            TaskType::Analyze => "analyze",
            TaskType::Call => "call",
            TaskType::Summarize => "summarize",
            TaskType::Custom(s) => s.as_str(),
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a task chooses its tool: an explicit name, or `"auto"` letting the
/// execution engine rank candidates via the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSelector {
    Auto,
    Named(String),
}

impl ToolSelector {
    #[must_use]
    pub fn is_auto(&self) -> bool {
        matches!(self, ToolSelector::Auto)
    }
}

/// An atomic unit of a [`Plan`](crate::Plan).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub task_type: TaskType,
    pub tool: ToolSelector,
    pub parameters: HashMap<String, Value>,
    pub dependencies: Vec<String>,
    pub estimated_duration: Option<Duration>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub critical: bool,
}

impl Task {
    /// Construct a task with the required fields; optional fields default
    /// to `None`/empty as the execution engine falls back to configured
    /// defaults for timeout and retry budget.
    #[must_use]
    pub fn new(id: impl Into<String>, description: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            task_type,
            tool: ToolSelector::Auto,
            parameters: HashMap::new(),
            dependencies: Vec::new(),
            estimated_duration: None,
            timeout: None,
            max_retries: None,
            critical: false,
        }
    }

    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = ToolSelector::Named(tool.into());
        self
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.dependencies.push(dep.into());
        self
    }

    #[must_use]
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// String parameter accessor used by per-type validation (e.g. `search`
    /// requires `query`).
    #[must_use]
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }
}

/// Mechanical classification of an execution error, used both to decide
/// retry eligibility and to surface a recommended action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    ConnRefused,
    RateLimit,
    Auth,
    MissingResource,
    InvalidTask,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Performance,
    Infra,
    Resources,
    Security,
    Config,
    Unclassified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    BackoffRetry,
    ExponentialBackoffRetry,
    Escalate,
    None,
}

/// Full classification record attached to a failed [`TaskResult`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub kind: ErrorKind,
    pub category: ErrorCategory,
    pub recoverable: bool,
    pub recommended_action: RecommendedAction,
    pub confidence: f32,
}

impl ErrorClassification {
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            kind: ErrorKind::Unknown,
            category: ErrorCategory::Unclassified,
            recoverable: false,
            recommended_action: RecommendedAction::Escalate,
            confidence: 0.0,
        }
    }
}

/// Outcome of executing one [`Task`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub success: bool,
    pub outcome: Option<Value>,
    pub error: Option<String>,
    pub tool_used: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration: Duration,
    pub retries: u32,
    pub error_classification: Option<ErrorClassification>,
}

impl TaskResult {
    #[must_use]
    pub fn success(
        task_id: impl Into<String>,
        outcome: Value,
        tool_used: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        retries: u32,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            success: true,
            outcome: Some(outcome),
            error: None,
            tool_used: Some(tool_used.into()),
            start,
            end,
            duration: (end - start).to_std().unwrap_or_default(),
            retries,
            error_classification: None,
        }
    }

    #[must_use]
    pub fn failure(
        task_id: impl Into<String>,
        error: impl Into<String>,
        classification: ErrorClassification,
        tool_used: Option<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        retries: u32,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            success: false,
            outcome: None,
            error: Some(error.into()),
            tool_used,
            start,
            end,
            duration: (end - start).to_std().unwrap_or_default(),
            retries,
            error_classification: Some(classification),
        }
    }
}
