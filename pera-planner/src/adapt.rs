use pera_memory::SkillMatch;
use pera_types::plan::{Plan, PlanMetadata};
use pera_types::skill::Skill;
use pera_types::task::{Task, TaskType};

use crate::llm::LlmReasoner;

/// Contextual relevance of a candidate skill to the inferred intent: 1.0 if
/// one of the skill's categories matches the intent tag, 0.5 otherwise. A
/// coarse stand-in for the richer context-matching the teacher's
/// embeddings module would support, since the spec leaves "contextual
/// relevance" otherwise undefined.
fn contextual_relevance(skill: &Skill, intent_tag: &str) -> f32 {
    if skill.categories.iter().any(|c| c == intent_tag) {
        1.0
    } else {
        0.5
    }
}

/// Rank candidate skills by `similarity(0.4) + historical success(0.4) +
/// contextual relevance(0.2)` and return the top match (`spec.md` §4.4).
#[must_use]
pub fn rank_candidates<'a>(candidates: &'a [SkillMatch], intent_tag: &str) -> Option<&'a SkillMatch> {
    candidates
        .iter()
        .max_by(|a, b| {
            let score_a = weighted_score(a, intent_tag);
            let score_b = weighted_score(b, intent_tag);
            score_a.total_cmp(&score_b)
        })
}

fn weighted_score(candidate: &SkillMatch, intent_tag: &str) -> f32 {
    0.4 * candidate.similarity
        + 0.4 * candidate.skill.success_rate()
        + 0.2 * contextual_relevance(&candidate.skill, intent_tag)
}

fn task_type_for_action(action: &str) -> TaskType {
    match action {
        "search" => TaskType::Search,
        "generate" => TaskType::Generate,
        "analyze" => TaskType::Analyze,
        "call" => TaskType::Call,
        "summarize" => TaskType::Summarize,
        other => TaskType::Custom(other.to_string()),
    }
}

/// Build a [`Plan`] from a skill's step sequence, keeping step order.
/// Descriptions are rewritten by `reasoner` for the new goal when one is
/// supplied; without one, the skill's own step action text is kept
/// verbatim (a deployment without an LLM collaborator still gets a usable,
/// if less tailored, plan).
pub async fn adapt_skill(
    skill: &Skill,
    goal_text: &str,
    reasoner: Option<&dyn LlmReasoner>,
) -> Plan {
    let mut tasks = Vec::with_capacity(skill.steps.len());
    for (idx, step) in skill.steps.iter().enumerate() {
        let description = if let Some(reasoner) = reasoner {
            let prompt = format!(
                "Rewrite this step description for the new goal \"{goal_text}\" without changing its \
                 intent: \"{}\"",
                step.action
            );
            reasoner.generate(&prompt, 0.1, 256).await.unwrap_or_else(|_| step.action.clone())
        } else {
            step.action.clone()
        };

        let mut task = Task::new(format!("step-{idx}"), description, task_type_for_action(&step.action));
        for (key, value) in &step.parameters {
            task = task.with_param(key.clone(), value.clone());
        }
        if idx > 0 {
            task = task.with_dependency(format!("step-{}", idx - 1));
        }
        tasks.push(task);
    }

    let metadata = PlanMetadata::adapted(skill.id, skill.success_rate().max(0.5));
    Plan::new(goal_text, tasks, metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pera_types::skill::{SkillAuthor, SkillStep, SkillType, UsageStats};

    fn sample_skill() -> Skill {
        let steps = vec![
            SkillStep {
                action: "search".to_string(),
                parameters: Default::default(),
                required_tools: vec![],
                preconditions: vec![],
            },
            SkillStep {
                action: "summarize".to_string(),
                parameters: Default::default(),
                required_tools: vec![],
                preconditions: vec![],
            },
        ];
        Skill {
            id: uuid::Uuid::new_v4(),
            name: "find-and-summarize".to_string(),
            skill_type: SkillType::Procedure,
            version: pera_types::skill::SkillVersion::initial(),
            description: "finds and summarizes".to_string(),
            objectives: vec![],
            categories: vec!["search".to_string()],
            steps,
            preconditions: vec![],
            postconditions: vec![],
            performance: Default::default(),
            usage: UsageStats { total: 10, successes: 9, failures: 1, last_used: None },
            related_skills: vec![],
            dependencies: vec![],
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            author: SkillAuthor::System,
            estimated_timeout: None,
            resource_estimates: Default::default(),
            embedding: None,
        }
    }

    #[test]
    fn ranking_prefers_higher_similarity_and_success() {
        let good = SkillMatch { skill: sample_skill(), similarity: 0.9 };
        let mut worse_skill = sample_skill();
        worse_skill.usage = UsageStats { total: 10, successes: 2, failures: 8, last_used: None };
        let bad = SkillMatch { skill: worse_skill, similarity: 0.9 };
        let candidates = vec![bad, good.clone()];
        let top = rank_candidates(&candidates, "search").unwrap();
        assert!((top.skill.success_rate() - good.skill.success_rate()).abs() < 1e-6);
    }

    #[tokio::test]
    async fn adapt_preserves_step_order_and_dependencies() {
        let skill = sample_skill();
        let plan = adapt_skill(&skill, "find and summarize the news", None).await;
        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(plan.tasks[0].id, "step-0");
        assert_eq!(plan.tasks[1].dependencies, vec!["step-0".to_string()]);
        assert_eq!(plan.metadata.source_skill_id, Some(skill.id));
    }
}
