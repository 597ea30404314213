#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

//! # PERA Test Utils
//!
//! Shared fixtures for the workspace's integration tests and benchmarks: a
//! configurable reference [`Tool`](pera_registry::Tool) implementation
//! (grounded in `pera-registry`'s own `#[cfg(test)] EchoTool`, generalized
//! here so it can be depended on from outside that crate) plus builder
//! functions for [`Goal`](pera_types::Goal), [`Task`](pera_types::Task),
//! [`Plan`](pera_types::Plan), [`Skill`](pera_types::Skill), and
//! [`Episode`](pera_types::Episode) fixtures that would otherwise be
//! duplicated across every crate's own test module.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pera_registry::{ParamSchema, ParamType, Tool, ToolMetrics};
use pera_types::episode::{Episode, GlobalState};
use pera_types::plan::{Plan, PlanMetadata};
use pera_types::skill::{
    PerformanceMetrics, Skill, SkillAuthor, SkillStep, SkillType, SkillVersion, UsageStats,
};
use pera_types::task::{Task, TaskResult, TaskType};
use serde_json::Value;
use uuid::Uuid;

/// A scriptable [`Tool`]: succeeds by default, echoing its `value`
/// parameter, but can be told to fail its next N calls with a given error
/// message — useful for driving the retry scenarios in `spec.md` §8
/// without each test hand-rolling a flaky tool.
pub struct ScriptedTool {
    name: String,
    metrics: ToolMetrics,
    blocking: bool,
    fail_next: AtomicU32,
    fail_message: std::sync::Mutex<String>,
    delay: std::sync::Mutex<Duration>,
}

impl ScriptedTool {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metrics: ToolMetrics::new(),
            blocking: false,
            fail_next: AtomicU32::new(0),
            fail_message: std::sync::Mutex::new("connection refused".to_string()),
            delay: std::sync::Mutex::new(Duration::ZERO),
        }
    }

    #[must_use]
    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }

    /// Fail the next `count` calls with `message`, then succeed.
    pub fn fail_next_calls(&self, count: u32, message: impl Into<String>) {
        self.fail_next.store(count, Ordering::SeqCst);
        *self.fail_message.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = message.into();
    }

    /// Sleep for `delay` before returning on every subsequent call, used to
    /// exercise timeout handling deterministically.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = delay;
    }
}

#[async_trait]
impl Tool for ScriptedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn parameter_schema(&self) -> Vec<ParamSchema> {
        vec![ParamSchema::optional("value", ParamType::String, Value::Null)]
    }

    fn is_blocking(&self) -> bool {
        self.blocking
    }

    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<Value> {
        let delay = *self.delay.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.fetch_sub(1, Ordering::SeqCst);
            let message = self.fail_message.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone();
            anyhow::bail!(message);
        }

        Ok(params.get("value").cloned().unwrap_or(Value::String(format!("{}-result", self.name))))
    }

    fn metrics(&self) -> &ToolMetrics {
        &self.metrics
    }
}

/// A goal with a fresh random session ID.
#[must_use]
pub fn goal(text: impl Into<String>) -> pera_types::goal::Goal {
    pera_types::goal::Goal::new(Uuid::new_v4(), text, HashMap::new())
}

/// A single-field search task, the shape most fixtures in this workspace
/// use for the `spec.md` §8 scenario 1 ("search-then-summarize").
#[must_use]
pub fn search_task(id: &str, query: &str) -> Task {
    Task::new(id, format!("search for {query}"), TaskType::Search).with_param("query", Value::String(query.to_string()))
}

#[must_use]
pub fn generate_task(id: &str, prompt: &str, depends_on: &str) -> Task {
    Task::new(id, format!("generate from {depends_on}"), TaskType::Generate)
        .with_param("prompt", Value::String(prompt.to_string()))
        .with_dependency(depends_on)
}

#[must_use]
pub fn plan(objective: impl Into<String>, tasks: Vec<Task>) -> Plan {
    Plan::new(objective, tasks, PlanMetadata::generated(0.9))
}

#[must_use]
pub fn task_result_success(task_id: &str, tool: &str, start: DateTime<Utc>, duration: Duration) -> TaskResult {
    TaskResult::success(task_id, Value::Null, tool, start, start + chrono::Duration::from_std(duration).unwrap_or_default(), 0)
}

/// A minimal one-step [`Skill`] fixture, content-hashed from `name` and
/// `description` so repeated calls with the same arguments collapse to the
/// same ID (mirroring `Skill::content_hash_id`'s contract).
#[must_use]
pub fn skill(name: &str, description: &str, categories: &[&str]) -> Skill {
    let steps = vec![SkillStep {
        action: "search".to_string(),
        parameters: HashMap::new(),
        required_tools: vec![],
        preconditions: vec![],
    }];
    Skill {
        id: Skill::content_hash_id(name, description, &steps),
        name: name.to_string(),
        skill_type: SkillType::Procedure,
        version: SkillVersion::initial(),
        description: description.to_string(),
        objectives: vec![description.to_string()],
        categories: categories.iter().map(|c| (*c).to_string()).collect(),
        steps,
        preconditions: vec![],
        postconditions: vec![],
        performance: PerformanceMetrics::new(),
        usage: UsageStats::default(),
        related_skills: vec![],
        dependencies: vec![],
        created_at: Utc::now(),
        updated_at: Utc::now(),
        author: SkillAuthor::System,
        estimated_timeout: None,
        resource_estimates: HashMap::new(),
        embedding: None,
    }
}

/// A one-task-plan episode whose task either succeeds or fails, the
/// baseline fixture the learning-loop tests build larger scenarios out
/// of. `success = false` records a failed [`TaskResult`] and
/// [`GlobalState::Failure`], letting preference-sampling scenarios mix
/// outcomes for a given tool instead of only ever observing successes.
#[must_use]
pub fn episode_with_outcome(goal_text: &str, task_type: TaskType, tool: &str, duration: Duration, success: bool) -> Episode {
    let start = Utc::now();
    let end = start + chrono::Duration::from_std(duration).unwrap_or_default();
    let task = Task::new("t1", goal_text, task_type);
    let (result, global_state) = if success {
        (TaskResult::success(task.id.clone(), Value::Null, tool, start, end, 0), GlobalState::Success)
    } else {
        let classification = pera_types::task::ErrorClassification::unknown();
        (
            TaskResult::failure(task.id.clone(), "tool reported failure", classification, Some(tool.to_string()), start, end, 0),
            GlobalState::Failure,
        )
    };
    let plan = Plan::new(goal_text, vec![task], PlanMetadata::generated(0.9));
    Episode::new(
        goal_text.to_string(),
        Uuid::new_v4(),
        plan,
        vec![result],
        global_state,
        HashMap::new(),
        start,
        end,
        "0.1.0".to_string(),
    )
}

/// A successful episode over a one-task plan. Thin wrapper over
/// [`episode_with_outcome`] kept for call sites that never need failures.
#[must_use]
pub fn successful_episode(goal_text: &str, task_type: TaskType, tool: &str, duration: Duration) -> Episode {
    episode_with_outcome(goal_text, task_type, tool, duration, true)
}
