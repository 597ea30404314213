use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pera_memory::KnowledgeStore;
use pera_registry::ToolRegistry;
use pera_types::config::ExecutionConfig;
use pera_types::task::{Task, TaskResult, ToolSelector};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::classify::{classify_error, invalid_task_classification};
use crate::metadata::{ExecutionMetadata, ExecutionState};
use crate::retry::compute_delay;
use crate::validate::validate_task;

/// Per-task context threaded through `execute_task`: which session/plan the
/// task belongs to, and the cooperative cancellation signal the
/// orchestrator uses to abort an in-flight run (`spec.md` §4.3's "supports
/// cancellation" requirement — not present in the teacher, added per
/// `DESIGN.md`'s documented `tokio-util` addition).
#[derive(Clone)]
pub struct ExecutionContext {
    pub session_id: Uuid,
    pub cancellation: CancellationToken,
}

impl ExecutionContext {
    #[must_use]
    pub fn new(session_id: Uuid) -> Self {
        Self { session_id, cancellation: CancellationToken::new() }
    }
}

/// The Execution Engine (`spec.md` §4.3): validates a task, resolves its
/// tool through the registry, dispatches with a timeout, classifies
/// failures, and retries with backoff until the task's retry budget (or
/// the engine's default) is exhausted.
pub struct ExecutionEngine {
    registry: Arc<ToolRegistry>,
    config: ExecutionConfig,
    knowledge: Option<Arc<dyn KnowledgeStore>>,
}

impl ExecutionEngine {
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, config: ExecutionConfig) -> Self {
        Self { registry, config, knowledge: None }
    }

    /// Attach a knowledge store so successful/failed executions update the
    /// per-task-type tool preference (`spec.md` §4.3 step 5, grounded in
    /// `KnowledgeStore::update_preference`).
    #[must_use]
    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeStore>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    fn max_retries(&self, task: &Task) -> u32 {
        task.max_retries.unwrap_or(self.config.max_retries)
    }

    fn timeout(&self, task: &Task) -> Duration {
        match task.timeout {
            Some(explicit) => explicit.min(Duration::from_secs(self.config.default_timeout_secs)),
            None => Duration::from_secs(self.config.default_timeout_secs),
        }
    }

    /// Execute one task to completion: validate, resolve a tool (explicit
    /// or ranked by the registry), dispatch under a timeout, and retry
    /// transient failures with backoff until the budget is spent or the
    /// context is canceled.
    pub async fn execute_task(&self, task: &Task, ctx: &ExecutionContext) -> (TaskResult, ExecutionMetadata) {
        let start = Utc::now();

        if let Err(message) = validate_task(task) {
            let end = Utc::now();
            let classification = invalid_task_classification();
            let result =
                TaskResult::failure(&task.id, message, classification, None, start, end, 0);
            let metadata = ExecutionMetadata::new(
                &task.id,
                ctx.session_id,
                start,
                end,
                ExecutionState::Failure,
                None,
                task.parameters.clone(),
                Some(classification),
                0,
                task.estimated_duration,
            );
            return (result, metadata);
        }

        let tool = match &task.tool {
            ToolSelector::Named(name) => self.registry.resolve(name),
            ToolSelector::Auto => self.registry.best_for_task_type(task.task_type.as_str()),
        };
        let tool = match tool {
            Ok(tool) => tool,
            Err(err) => {
                let end = Utc::now();
                let classification = classify_error(&err.to_string());
                let result = TaskResult::failure(&task.id, err.to_string(), classification, None, start, end, 0);
                let metadata = ExecutionMetadata::new(
                    &task.id,
                    ctx.session_id,
                    start,
                    end,
                    ExecutionState::Failure,
                    None,
                    task.parameters.clone(),
                    Some(classification),
                    0,
                    task.estimated_duration,
                );
                return (result, metadata);
            }
        };

        let max_retries = self.max_retries(task);
        let backoff = self.config.retry_backoff;
        let base_delay = Duration::from_secs(self.config.retry_base_delay_secs);
        let timeout = self.timeout(task);

        let mut attempt = 0u32;
        loop {
            if ctx.cancellation.is_cancelled() {
                let end = Utc::now();
                let classification = invalid_task_classification();
                let result = TaskResult::failure(
                    &task.id,
                    "canceled",
                    classification,
                    Some(tool.name().to_string()),
                    start,
                    end,
                    attempt,
                );
                let metadata = ExecutionMetadata::new(
                    &task.id,
                    ctx.session_id,
                    start,
                    end,
                    ExecutionState::Canceled,
                    Some(tool.name().to_string()),
                    task.parameters.clone(),
                    None,
                    attempt,
                    task.estimated_duration,
                );
                return (result, metadata);
            }

            enum Dispatch {
                Ran(pera_registry::SafeExecutionResult),
                TimedOut,
                Canceled,
            }

            let dispatch = tokio::select! {
                outcome = tokio::time::timeout(timeout, pera_registry::execute_safely(tool.as_ref(), task.parameters.clone())) => {
                    match outcome {
                        Ok(safe) => Dispatch::Ran(safe),
                        Err(_elapsed) => Dispatch::TimedOut,
                    }
                }
                () = ctx.cancellation.cancelled() => Dispatch::Canceled,
            };

            let attempt_end = Utc::now();

            match dispatch {
                Dispatch::Canceled => {
                    let classification = invalid_task_classification();
                    let result = TaskResult::failure(
                        &task.id,
                        "canceled",
                        classification,
                        Some(tool.name().to_string()),
                        start,
                        attempt_end,
                        attempt,
                    );
                    let metadata = ExecutionMetadata::new(
                        &task.id,
                        ctx.session_id,
                        start,
                        attempt_end,
                        ExecutionState::Canceled,
                        Some(tool.name().to_string()),
                        task.parameters.clone(),
                        None,
                        attempt,
                        task.estimated_duration,
                    );
                    return (result, metadata);
                }
                Dispatch::Ran(safe) if safe.success => {
                    if let Some(knowledge) = &self.knowledge {
                        let _ = knowledge
                            .update_preference(task.task_type.as_str(), tool.name(), true, safe.duration.as_secs_f32())
                            .await;
                    }
                    let outcome = safe.value.unwrap_or(serde_json::Value::Null);
                    let result =
                        TaskResult::success(&task.id, outcome, tool.name(), start, attempt_end, attempt);
                    let metadata = ExecutionMetadata::new(
                        &task.id,
                        ctx.session_id,
                        start,
                        attempt_end,
                        ExecutionState::Success,
                        Some(tool.name().to_string()),
                        task.parameters.clone(),
                        None,
                        attempt,
                        task.estimated_duration,
                    );
                    return (result, metadata);
                }
                Dispatch::Ran(safe) => {
                    let error = safe.error.unwrap_or_else(|| "tool returned no error detail".to_string());
                    let classification = classify_error(&error);
                    if let Some(knowledge) = &self.knowledge {
                        let _ = knowledge
                            .update_preference(task.task_type.as_str(), tool.name(), false, safe.duration.as_secs_f32())
                            .await;
                    }
                    if !classification.recoverable || attempt >= max_retries {
                        let result = TaskResult::failure(
                            &task.id,
                            error,
                            classification,
                            Some(tool.name().to_string()),
                            start,
                            attempt_end,
                            attempt,
                        );
                        let metadata = ExecutionMetadata::new(
                            &task.id,
                            ctx.session_id,
                            start,
                            attempt_end,
                            ExecutionState::Failure,
                            Some(tool.name().to_string()),
                            task.parameters.clone(),
                            Some(classification),
                            attempt,
                            task.estimated_duration,
                        );
                        return (result, metadata);
                    }
                }
                Dispatch::TimedOut => {
                    let classification = classify_error("operation timeout");
                    if attempt >= max_retries {
                        let result = TaskResult::failure(
                            &task.id,
                            "operation timed out",
                            classification,
                            Some(tool.name().to_string()),
                            start,
                            attempt_end,
                            attempt,
                        );
                        let metadata = ExecutionMetadata::new(
                            &task.id,
                            ctx.session_id,
                            start,
                            attempt_end,
                            ExecutionState::Timeout,
                            Some(tool.name().to_string()),
                            task.parameters.clone(),
                            Some(classification),
                            attempt,
                            task.estimated_duration,
                        );
                        return (result, metadata);
                    }
                }
            }

            attempt += 1;
            let delay = compute_delay(backoff, base_delay, attempt);
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = ctx.cancellation.cancelled() => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pera_registry::{TaskTypeCategoryMap, Tool};
    use pera_types::task::TaskType;
    use std::collections::HashMap as StdHashMap;

    struct FlakyTool {
        name: String,
        metrics: pera_registry::ToolMetrics,
        fail_times: std::sync::atomic::AtomicU32,
    }

    impl FlakyTool {
        fn new(name: &str, fail_times: u32) -> Self {
            Self {
                name: name.to_string(),
                metrics: pera_registry::ToolMetrics::new(),
                fail_times: std::sync::atomic::AtomicU32::new(fail_times),
            }
        }
    }

    #[async_trait::async_trait]
    impl Tool for FlakyTool {
        fn name(&self) -> &str {
            &self.name
        }
        fn version(&self) -> &str {
            "1.0.0"
        }
        fn parameter_schema(&self) -> Vec<pera_registry::ParamSchema> {
            Vec::new()
        }
        async fn execute(
            &self,
            _params: StdHashMap<String, serde_json::Value>,
        ) -> anyhow::Result<serde_json::Value> {
            let remaining = self.fail_times.load(std::sync::atomic::Ordering::SeqCst);
            if remaining > 0 {
                self.fail_times.store(remaining - 1, std::sync::atomic::Ordering::SeqCst);
                anyhow::bail!("connection refused");
            }
            Ok(serde_json::json!("ok"))
        }
        fn metrics(&self) -> &pera_registry::ToolMetrics {
            &self.metrics
        }
    }

    fn engine_with(tool: Arc<dyn Tool>) -> ExecutionEngine {
        let registry = Arc::new(ToolRegistry::new(
            TaskTypeCategoryMap::default().with("custom_probe", vec!["probe".to_string()]),
        ));
        registry.register(tool, vec!["probe".to_string()]);
        let mut config = ExecutionConfig::default();
        config.retry_base_delay_secs = 0;
        ExecutionEngine::new(Arc::new(registry), config)
    }

    #[tokio::test]
    async fn invalid_task_fails_without_dispatch() {
        let engine = engine_with(Arc::new(FlakyTool::new("probe", 0)));
        let task = Task::new("t1", "search", TaskType::Search);
        let ctx = ExecutionContext::new(Uuid::new_v4());
        let (result, metadata) = engine.execute_task(&task, &ctx).await;
        assert!(!result.success);
        assert_eq!(metadata.state, ExecutionState::Failure);
        assert_eq!(metadata.retries, 0);
    }

    #[tokio::test]
    async fn retries_transient_failure_until_success() {
        let tool: Arc<dyn Tool> = Arc::new(FlakyTool::new("probe", 2));
        let engine = engine_with(tool);
        let task = Task::new("t1", "probe", TaskType::Custom("custom_probe".to_string()));
        let ctx = ExecutionContext::new(Uuid::new_v4());
        let (result, metadata) = engine.execute_task(&task, &ctx).await;
        assert!(result.success);
        assert_eq!(metadata.retries, 2);
    }

    #[tokio::test]
    async fn exhausting_retry_budget_fails() {
        let tool: Arc<dyn Tool> = Arc::new(FlakyTool::new("probe", 100));
        let engine = engine_with(tool);
        let mut task = Task::new("t1", "probe", TaskType::Custom("custom_probe".to_string()))
            .with_tool("probe");
        task.max_retries = Some(1);
        let ctx = ExecutionContext::new(Uuid::new_v4());
        let (result, metadata) = engine.execute_task(&task, &ctx).await;
        assert!(!result.success);
        assert_eq!(metadata.retries, 1);
    }

    #[tokio::test]
    async fn cancellation_aborts_before_dispatch() {
        let tool: Arc<dyn Tool> = Arc::new(FlakyTool::new("probe", 100));
        let engine = engine_with(tool);
        let task = Task::new("t1", "probe", TaskType::Custom("custom_probe".to_string()))
            .with_tool("probe");
        let ctx = ExecutionContext::new(Uuid::new_v4());
        ctx.cancellation.cancel();
        let (result, metadata) = engine.execute_task(&task, &ctx).await;
        assert!(!result.success);
        assert_eq!(metadata.state, ExecutionState::Canceled);
    }
}
