use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use pera_exec::{ExecutionContext, ExecutionEngine};
use pera_memory::{EpisodicLog, KnowledgeStore, WorkingStore};
use pera_messaging::{CorrelationId, EventBus, EventEnvelope, EventType, Severity, SharedTraceRegistry, Span};
use pera_planner::Planner;
use pera_registry::ToolRegistry;
use pera_types::config::ConcurrencyConfig;
use pera_types::episode::{Episode, GlobalState};
use pera_types::execution::ExecutionMetadata;
use pera_types::goal::Goal;
use pera_types::plan::{Plan, PlanMetadata};
use pera_types::skill::{PerformanceMetrics, Skill, SkillAuthor, SkillStep, SkillType, SkillVersion, UsageStats};
use pera_types::task::TaskResult;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::state::SessionState;

/// Fire-and-forget hook invoked after an episode is recorded (`spec.md`
/// §4.5 step 6: "Schedule LRN asynchronously, passing the Episode ID").
/// `pera-learning` implements this; the orchestrator depends only on the
/// capability, not the concrete learning loop, per the capability-interface
/// design note in `spec.md` §9 — this is what keeps the two crates from
/// needing a cyclic dependency on each other.
pub trait LearningScheduler: Send + Sync {
    fn schedule(&self, episode_id: Uuid);
}

/// A [`LearningScheduler`] that does nothing, for deployments that drive
/// `pera-learning`'s periodic cycle independently of per-episode triggers.
pub struct NoopLearningScheduler;

impl LearningScheduler for NoopLearningScheduler {
    fn schedule(&self, _episode_id: Uuid) {}
}

/// Outcome of one [`Orchestrator::run_goal`] call (`spec.md` §4.5 step 7 /
/// §6's submit-goal entry point).
#[derive(Debug, Clone)]
pub struct GoalOutcome {
    pub session_id: Uuid,
    pub state: GlobalState,
    pub results: Vec<TaskResult>,
    pub episode_id: Option<Uuid>,
}

/// Drives one goal end-to-end through the `SessionState` machine
/// (`spec.md` §4.5), wiring together the Planner, Execution Engine,
/// Working/Episodic stores, and the event bus / trace registry.
pub struct Orchestrator {
    working: Arc<dyn WorkingStore>,
    episodic: Arc<dyn EpisodicLog>,
    registry: Arc<ToolRegistry>,
    engine: Arc<ExecutionEngine>,
    planner: Arc<Planner>,
    bus: Arc<EventBus>,
    traces: SharedTraceRegistry,
    learning: Arc<dyn LearningScheduler>,
    knowledge: Option<Arc<dyn KnowledgeStore>>,
    concurrency: ConcurrencyConfig,
    global_admission: Arc<Semaphore>,
    system_version: String,
    sessions: tokio::sync::Mutex<HashMap<Uuid, CancellationToken>>,
}

impl Orchestrator {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        working: Arc<dyn WorkingStore>,
        episodic: Arc<dyn EpisodicLog>,
        registry: Arc<ToolRegistry>,
        engine: Arc<ExecutionEngine>,
        planner: Arc<Planner>,
        bus: Arc<EventBus>,
        traces: SharedTraceRegistry,
        concurrency: ConcurrencyConfig,
        system_version: impl Into<String>,
    ) -> Self {
        let global_admission = Arc::new(Semaphore::new(concurrency.global_worker_count.max(1)));
        Self {
            working,
            episodic,
            registry,
            engine,
            planner,
            bus,
            traces,
            learning: Arc::new(NoopLearningScheduler),
            knowledge: None,
            concurrency,
            global_admission,
            system_version: system_version.into(),
            sessions: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_learning_scheduler(mut self, learning: Arc<dyn LearningScheduler>) -> Self {
        self.learning = learning;
        self
    }

    /// Attach a Knowledge Store so successful task executions can be
    /// upserted as lightweight skill samples (`spec.md` §4.3). Without
    /// one, episodes still carry their `task_metadata` records, but no
    /// skill sample is derived.
    #[must_use]
    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeStore>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    /// Cancel an in-flight session. Returns `false` if no session with that
    /// ID is currently running (`spec.md` §5 "Cancellation").
    pub async fn cancel_session(&self, session_id: Uuid) -> bool {
        if let Some(token) = self.sessions.lock().await.get(&session_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    fn record_span(
        &self,
        correlation_id: CorrelationId,
        module: &str,
        action: &str,
        start: chrono::DateTime<Utc>,
        success: bool,
        error: Option<String>,
        is_root: bool,
    ) {
        let span = Span::new(module, action, start).finish(Utc::now(), success, error);
        self.traces.record(correlation_id, span, is_root);
    }

    /// Dispatch every task in a dependency-independent band concurrently,
    /// bounded by the per-session concurrency cap (`spec.md` §5
    /// "Parallelism within a goal").
    async fn execute_band(
        &self,
        band: &[usize],
        plan: &Plan,
        ctx: &ExecutionContext,
        permits: &Arc<Semaphore>,
    ) -> Vec<(String, TaskResult, ExecutionMetadata)> {
        let mut handles = Vec::with_capacity(band.len());
        for &idx in band {
            let task = plan.tasks[idx].clone();
            let engine = Arc::clone(&self.engine);
            let ctx = ctx.clone();
            let permits = Arc::clone(permits);
            handles.push(tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let (result, metadata) = engine.execute_task(&task, &ctx).await;
                (task.id.clone(), result, metadata)
            }));
        }
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(item) = handle.await {
                out.push(item);
            }
        }
        out
    }

    /// Extract `{taskType, tool, parameters, duration}` from a successful
    /// execution and upsert it into the Knowledge Store as a lightweight
    /// skill sample (`spec.md` §4.3). A no-op when no store is attached or
    /// the tool could not be resolved (validation failures never reach a
    /// tool, so there is nothing to learn from them).
    async fn upsert_skill_sample(&self, task_type: &str, metadata: &ExecutionMetadata) {
        let Some(knowledge) = &self.knowledge else { return };
        let Some(tool) = &metadata.tool_used else { return };

        let name = format!("{task_type}:{tool}");
        let description = format!("executes {task_type} tasks using {tool}");
        let steps = vec![SkillStep {
            action: tool.clone(),
            parameters: metadata.parameters_snapshot.clone(),
            required_tools: vec![tool.clone()],
            preconditions: vec![],
        }];
        let id = Skill::content_hash_id(&name, &description, &steps);

        let mut skill = match knowledge.get_skill(id).await {
            Ok(Some(existing)) => existing,
            _ => Skill {
                id,
                name,
                skill_type: SkillType::Procedure,
                version: SkillVersion::initial(),
                description,
                objectives: vec![format!("complete {task_type} tasks")],
                categories: vec![task_type.to_string()],
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
            },
        };
        skill.record_use(true, metadata.duration.as_secs_f32(), 0.2);
        if let Err(err) = knowledge.save_skill(skill).await {
            tracing::warn!(%err, task_type, tool, "failed to upsert skill sample");
        }
    }

    /// Aggregate per-task results into a `GlobalState` (`spec.md` §4.5 step
    /// 4): success iff no critical task failed and the success ratio meets
    /// the configured threshold; partial if some but not enough tasks
    /// succeeded; timeout/canceled propagate from their triggering
    /// condition.
    fn aggregate_state(
        results: &[TaskResult],
        critical_failure: bool,
        timed_out: bool,
        canceled: bool,
        success_ratio_threshold: f32,
    ) -> GlobalState {
        if canceled {
            return GlobalState::Canceled;
        }
        if timed_out {
            return GlobalState::Timeout;
        }
        if critical_failure || results.is_empty() {
            return GlobalState::Failure;
        }
        let successes = results.iter().filter(|r| r.success).count();
        let ratio = successes as f32 / results.len() as f32;
        if ratio >= success_ratio_threshold {
            GlobalState::Success
        } else if successes > 0 {
            GlobalState::Partial
        } else {
            GlobalState::Failure
        }
    }

    async fn execute_cycle(
        &self,
        goal: &Goal,
        correlation_id: CorrelationId,
        cancellation: &CancellationToken,
        state: &mut SessionState,
    ) -> Result<GoalOutcome> {
        let session_id = goal.session_id;
        let cycle_start = Utc::now();

        // 1 & 2: planning.
        state.transition(SessionState::Planning)?;
        let plan_start = Utc::now();
        let known_tools = self.registry.tool_names();
        let plan = self.planner.generate_plan(goal, &known_tools).await?;
        self.record_span(correlation_id, "orchestrator", "plan", plan_start, true, None, false);
        self.working.put(session_id, "plan_current", serde_json::to_value(&plan)?, None).await?;
        self.bus.publish(EventEnvelope::new(
            EventType::PlanGenerated,
            Severity::Info,
            "orchestrator",
            correlation_id,
            serde_json::json!({"session_id": session_id, "task_count": plan.tasks.len()}),
        ));

        // 3: executing, one dependency-independent band at a time.
        state.transition(SessionState::Executing)?;
        let order = plan.validate_dag()?;
        let bands = plan.bands(&order);
        let plan_timeout = plan.critical_path_timeout(&order);
        let per_session_permits =
            Arc::new(Semaphore::new(self.concurrency.per_session_concurrency_cap.max(1)));
        let ctx = ExecutionContext { session_id, cancellation: cancellation.clone() };

        let exec_start = Utc::now();
        let mut results: Vec<TaskResult> = Vec::with_capacity(plan.tasks.len());
        let mut task_metadata: Vec<ExecutionMetadata> = Vec::with_capacity(plan.tasks.len());
        let mut critical_failure = false;
        let mut timed_out = false;

        for band in &bands {
            if critical_failure {
                break;
            }
            let band_results =
                match tokio::time::timeout(plan_timeout, self.execute_band(band, &plan, &ctx, &per_session_permits))
                    .await
                {
                    Ok(results) => results,
                    Err(_elapsed) => {
                        timed_out = true;
                        break;
                    }
                };
            for (task_id, result, metadata) in band_results {
                self.working
                    .put(session_id, &format!("result_{task_id}"), serde_json::to_value(&result)?, None)
                    .await?;
                self.bus.publish(EventEnvelope::new(
                    EventType::TaskExecuted,
                    if result.success { Severity::Info } else { Severity::Warning },
                    "orchestrator",
                    correlation_id,
                    serde_json::json!({"task_id": task_id, "success": result.success}),
                ));

                let task = plan.tasks.iter().find(|t| t.id == task_id);
                let is_critical = task.is_some_and(|t| t.critical);
                if !result.success && is_critical {
                    critical_failure = true;
                }
                if let Some(task) = task.filter(|_| result.success) {
                    self.upsert_skill_sample(task.task_type.as_str(), &metadata).await;
                }
                results.push(result);
                task_metadata.push(metadata);
            }
        }
        self.record_span(
            correlation_id,
            "orchestrator",
            "execute",
            exec_start,
            !critical_failure && !timed_out,
            None,
            false,
        );

        let global_state = Self::aggregate_state(
            &results,
            critical_failure,
            timed_out,
            cancellation.is_cancelled(),
            self.concurrency.success_ratio_threshold,
        );

        // 4 & 5: record one episode.
        state.transition(SessionState::Recording)?;
        let cycle_end = Utc::now();
        let episode = Episode::new(
            goal.text.clone(),
            session_id,
            plan,
            results.clone(),
            global_state,
            goal.context.clone(),
            cycle_start,
            cycle_end,
            self.system_version.clone(),
        )
        .with_task_metadata(task_metadata);
        let episode_id = self.episodic.append_episode(episode).await?;
        self.bus.publish(EventEnvelope::new(
            EventType::EpisodeRecorded,
            Severity::Info,
            "orchestrator",
            correlation_id,
            serde_json::json!({"episode_id": episode_id, "state": format!("{global_state:?}")}),
        ));

        // 6: schedule learning, clean up, done. A canceled cycle still
        // records its episode but never schedules learning over it
        // (spec's cancellation-propagation scenario: partial, canceled
        // work shouldn't feed tool preferences or skill derivation).
        state.transition(SessionState::LearningScheduled)?;
        if global_state != GlobalState::Canceled {
            self.learning.schedule(episode_id);
        }
        self.working.clear(session_id).await?;
        state.transition(SessionState::Done)?;

        self.record_span(correlation_id, "orchestrator", "run_cycle", cycle_start, true, None, true);

        Ok(GoalOutcome { session_id, state: global_state, results, episode_id: Some(episode_id) })
    }

    /// Drive `goal` through the full PERA cycle (`spec.md` §4.5). Admits
    /// the session under the global worker cap (`spec.md` §5
    /// "Parallelism"), queueing FIFO on saturation since `tokio::Semaphore`
    /// wakes waiters in acquire order.
    ///
    /// # Errors
    ///
    /// Any error not raised from task execution itself (planning,
    /// validation, or store failures) is surfaced here after recording a
    /// diagnostic error Episode; learning is never scheduled for these
    /// system-level failures (`spec.md` §4.5 "Failure semantics").
    pub async fn run_goal(&self, goal: Goal) -> Result<GoalOutcome> {
        let _permit = self.global_admission.acquire().await.map_err(|_| Error::AdmissionClosed)?;
        let session_id = goal.session_id;
        let correlation_id = CorrelationId::from(session_id);
        let cancellation = CancellationToken::new();
        self.sessions.lock().await.insert(session_id, cancellation.clone());

        let mut state = SessionState::Init;
        let start = Utc::now();
        let outcome = self.execute_cycle(&goal, correlation_id, &cancellation, &mut state).await;

        self.sessions.lock().await.remove(&session_id);

        match outcome {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                let _ = state.transition(SessionState::Error);
                let end = Utc::now();
                let mut context = goal.context.clone();
                context.insert(
                    "error_diagnostic".to_string(),
                    serde_json::json!({"error": err.to_string(), "state_at_failure": format!("{state:?}")}),
                );
                let placeholder_plan = Plan::new(goal.text.clone(), vec![], PlanMetadata::generated(0.0));
                let episode = Episode::new(
                    goal.text.clone(),
                    session_id,
                    placeholder_plan,
                    Vec::new(),
                    GlobalState::Failure,
                    context,
                    start,
                    end,
                    self.system_version.clone(),
                );
                let _ = self.episodic.append_episode(episode).await;
                self.bus.publish(EventEnvelope::new(
                    EventType::SystemError,
                    Severity::Error,
                    "orchestrator",
                    correlation_id,
                    serde_json::json!({"error": err.to_string()}),
                ));
                Err(err)
            }
        }
    }
}
