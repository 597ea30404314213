use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use pera_memory::KnowledgeStore;
use pera_types::config::PlanningConfig;
use pera_types::goal::Goal;
use pera_types::plan::{Plan, PlanMetadata, PlanOrigin};
use pera_types::task::{Task, TaskType};

use crate::adapt::{adapt_skill, rank_candidates};
use crate::cache::PlanCache;
use crate::error::{Error, Result};
use crate::intent::{is_complex, preprocess};
use crate::llm::{build_prompt, reason, LlmReasoner, ReasonedPlan, ReasonedTask};
use crate::strategy::{select_strategy, Strategy};
use crate::validate::validate_plan;

fn reasoned_task_type(raw: &str) -> TaskType {
    match raw {
        "search" => TaskType::Search,
        "generate" => TaskType::Generate,
        "analyze" => TaskType::Analyze,
        "call" => TaskType::Call,
        "summarize" => TaskType::Summarize,
        other => TaskType::Custom(other.to_string()),
    }
}

fn task_from_reasoned(reasoned: &ReasonedTask) -> Task {
    let mut task = Task::new(
        reasoned.id.clone(),
        reasoned.description.clone(),
        reasoned_task_type(&reasoned.task_type),
    );
    if let Some(tool) = &reasoned.tool {
        task = task.with_tool(tool.clone());
    }
    for (key, value) in &reasoned.parameters {
        task = task.with_param(key.clone(), value.clone());
    }
    for dep in &reasoned.dependencies {
        task = task.with_dependency(dep.clone());
    }
    task
}

fn plan_from_reasoned(reasoned: ReasonedPlan, metadata: PlanMetadata) -> Plan {
    let tasks = reasoned.tasks.iter().map(task_from_reasoned).collect();
    let mut plan = Plan::new(reasoned.objective, tasks, metadata);
    plan.resource_requirements = reasoned.resource_requirements.into_iter().collect();
    plan.constraints = reasoned.constraints;
    plan
}

/// Union two task sets by ID, preferring the first set's task on overlap
/// (`spec.md` §4.4 step 3: "union the task sets, deduplicating on task
/// ID").
fn union_by_task_id(primary: Vec<Task>, secondary: Vec<Task>) -> Vec<Task> {
    let mut seen: HashSet<String> = primary.iter().map(|t| t.id.clone()).collect();
    let mut merged = primary;
    for task in secondary {
        if seen.insert(task.id.clone()) {
            merged.push(task);
        }
    }
    merged
}

/// The Planner (`spec.md` §4.4): turns a goal into a validated, optimized
/// [`Plan`], preferring previously-learned skills over LLM reasoning and
/// caching recent results.
pub struct Planner {
    knowledge: Arc<dyn KnowledgeStore>,
    reasoner: Option<Arc<dyn LlmReasoner>>,
    config: PlanningConfig,
    cache: PlanCache,
}

impl Planner {
    #[must_use]
    pub fn new(knowledge: Arc<dyn KnowledgeStore>, config: PlanningConfig) -> Self {
        let cache = PlanCache::new(config.cache_capacity);
        Self { knowledge, reasoner: None, config, cache }
    }

    #[must_use]
    pub fn with_reasoner(mut self, reasoner: Arc<dyn LlmReasoner>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    async fn decompose(&self, goal_text: &str, normalized: &str, intent_tag: &str) -> Result<Plan> {
        let intent = crate::intent::classify_intent(normalized);
        let strategy =
            select_strategy(self.knowledge.as_ref(), normalized, intent, self.config.similarity_threshold)
                .await?;

        match strategy {
            Strategy::SkillBased(candidates) => {
                let top = rank_candidates(&candidates, intent_tag)
                    .ok_or_else(|| Error::PlanningFailed(0, "no candidate skill".to_string()))?;
                Ok(adapt_skill(&top.skill, goal_text, self.reasoner.as_deref().map(|r| r as &dyn LlmReasoner))
                    .await)
            }
            Strategy::LlmReasoning => self.reason_plan(goal_text, intent_tag, PlanOrigin::Generated).await,
            Strategy::Hybrid(candidates) => {
                if candidates.is_empty() {
                    return self.reason_plan(goal_text, intent_tag, PlanOrigin::Hybrid).await;
                }
                let top = rank_candidates(&candidates, intent_tag)
                    .ok_or_else(|| Error::PlanningFailed(0, "no candidate skill".to_string()))?;
                let confidence = top.similarity.max(top.skill.success_rate());
                let skill_plan = adapt_skill(
                    &top.skill,
                    goal_text,
                    self.reasoner.as_deref().map(|r| r as &dyn LlmReasoner),
                )
                .await;

                if confidence >= self.config.skill_confidence_threshold {
                    return Ok(skill_plan);
                }

                let llm_plan = self.reason_plan(goal_text, intent_tag, PlanOrigin::Hybrid).await?;
                let merged_tasks = union_by_task_id(skill_plan.tasks, llm_plan.tasks);
                let mut merged = Plan::new(
                    goal_text,
                    merged_tasks,
                    PlanMetadata::hybrid(Some(top.skill.id), confidence),
                );
                merged.resource_requirements = llm_plan.resource_requirements;
                merged.constraints = llm_plan.constraints;
                Ok(merged)
            }
        }
    }

    /// Fill each task's missing parameters from the Knowledge Store's
    /// stored per-`(taskType, parameter)` defaults (`spec.md` §4.4
    /// "Optimization": "normalize parameters by applying any stored
    /// per-(taskType, parameter) defaults"). Never overwrites a parameter
    /// the task already set.
    async fn normalize_parameters(&self, plan: &mut Plan) {
        for task in &mut plan.tasks {
            let defaults = match self.knowledge.get_parameter_defaults(task.task_type.as_str()).await {
                Ok(defaults) => defaults,
                Err(_) => continue,
            };
            for (key, value) in defaults {
                task.parameters.entry(key).or_insert(value);
            }
        }
    }

    async fn reason_plan(&self, goal_text: &str, intent_tag: &str, origin: PlanOrigin) -> Result<Plan> {
        let reasoner = self
            .reasoner
            .as_ref()
            .ok_or_else(|| Error::Llm("no LLM reasoner configured".to_string()))?;
        let prompt = build_prompt(goal_text, intent_tag, &serde_json::Map::new());
        let reasoned = reason(reasoner.as_ref(), &prompt).await?;
        let metadata = match origin {
            PlanOrigin::Hybrid => PlanMetadata::hybrid(None, 0.7),
            _ => PlanMetadata::generated(0.7),
        };
        Ok(plan_from_reasoned(reasoned, metadata))
    }

    /// Generate a validated, optimized plan for `goal`, consulting (and
    /// populating) the plan cache, retrying generation up to
    /// `config.max_replan_attempts` times if validation fails
    /// (`spec.md` §4.4 "Validation": "invoke replan up to configured
    /// retries; on final failure raise PlanningError").
    pub async fn generate_plan(&self, goal: &Goal, known_tools: &HashSet<String>) -> Result<Plan> {
        let normalized = goal.normalized_text();
        if let Some(cached) = self.cache.get(&normalized) {
            return Ok(cached);
        }

        let (tagged, intent) = preprocess(&goal.text);
        let intent_tag = intent.tag();
        let _ = is_complex(&normalized);

        let mut last_error = None;
        for _attempt in 0..=self.config.max_replan_attempts {
            let mut plan = self.decompose(&tagged, &normalized, intent_tag).await?;
            self.normalize_parameters(&mut plan).await;
            match validate_plan(&plan, known_tools) {
                Ok(_) => {
                    self.cache.put(&normalized, plan.clone());
                    return Ok(plan);
                }
                Err(err) => last_error = Some(err),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::PlanningFailed(self.config.max_replan_attempts, "unknown validation failure".to_string())
        }))
    }
}
