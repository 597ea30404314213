use pera_memory::{KnowledgeStore, SkillMatch};
use pera_types::filters::SkillFilter;

use crate::error::Result;
use crate::intent::{is_complex, Intent};

/// Which decomposition strategy the planner should use for this goal
/// (`spec.md` §4.4 "Strategy selection"). Mirrors
/// `original_source/src/mcp/algoritmo_descomposicion.py`'s
/// `EstrategiaDescomposicion`, minus its emergency-mode fallback (handled
/// separately by the planner as a last resort, not a named strategy here).
#[derive(Debug, Clone)]
pub enum Strategy {
    SkillBased(Vec<SkillMatch>),
    LlmReasoning,
    Hybrid(Vec<SkillMatch>),
}

const SKILL_SUCCESS_RATE_THRESHOLD: f32 = 0.7;

/// Select a decomposition strategy: prefer skill-based when a confident
/// matching skill exists, fall back to LLM-reasoning for complex goals,
/// otherwise hybrid.
pub async fn select_strategy(
    knowledge: &dyn KnowledgeStore,
    normalized_goal: &str,
    intent: Intent,
    similarity_threshold: f32,
) -> Result<Strategy> {
    let filters = SkillFilter { min_success_rate: Some(SKILL_SUCCESS_RATE_THRESHOLD), ..Default::default() };
    let matches = knowledge.search_skills(normalized_goal, &filters, 5).await?;

    let confident: Vec<SkillMatch> = matches
        .into_iter()
        .filter(|m| m.similarity >= similarity_threshold && m.skill.success_rate() > SKILL_SUCCESS_RATE_THRESHOLD)
        .collect();

    if !confident.is_empty() {
        return Ok(Strategy::SkillBased(confident));
    }

    if is_complex(normalized_goal) {
        return Ok(Strategy::LlmReasoning);
    }

    // Hybrid: relaxed-confidence skill search (no success-rate floor) feeds
    // the skill side; the planner augments with LLM-reasoning if the
    // resulting confidence is still below 0.8 (`spec.md` §4.4 step 3).
    let relaxed_filters = SkillFilter::default();
    let relaxed = knowledge.search_skills(normalized_goal, &relaxed_filters, 5).await?;
    let relaxed: Vec<SkillMatch> =
        relaxed.into_iter().filter(|m| m.similarity >= similarity_threshold * 0.8).collect();
    Ok(Strategy::Hybrid(relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pera_memory::{EmbeddingProvider, HashingEmbeddingProvider, InMemoryKnowledgeStore};
    use pera_types::skill::{Skill, SkillAuthor, SkillStep, SkillType, UsageStats};
    use std::sync::Arc;

    fn store() -> InMemoryKnowledgeStore {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbeddingProvider::new(64));
        InMemoryKnowledgeStore::new(embedder, 0.1)
    }

    fn skill(name: &str, description: &str, successes: u64, total: u64) -> Skill {
        let steps = vec![SkillStep {
            action: "search".to_string(),
            parameters: Default::default(),
            required_tools: vec![],
            preconditions: vec![],
        }];
        Skill {
            id: Skill::content_hash_id(name, description, &steps),
            name: name.to_string(),
            skill_type: SkillType::Procedure,
            version: pera_types::skill::SkillVersion::initial(),
            description: description.to_string(),
            objectives: vec![description.to_string()],
            categories: vec!["search".to_string()],
            steps,
            preconditions: vec![],
            postconditions: vec![],
            performance: Default::default(),
            usage: UsageStats { total, successes, failures: total - successes, last_used: None },
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

    #[tokio::test]
    async fn picks_skill_based_when_a_confident_match_exists() {
        let store = store();
        store.save_skill(skill("find weather", "find the current weather", 90, 100)).await.unwrap();

        let strategy =
            select_strategy(&store, "find the current weather", Intent::Search, 0.1).await.unwrap();
        assert!(matches!(strategy, Strategy::SkillBased(_)));
    }

    #[tokio::test]
    async fn falls_back_to_llm_reasoning_for_complex_goals_with_no_match() {
        let store = store();
        let goal = "first do one thing and then do another thing depending on the weather outcome";
        let strategy = select_strategy(&store, goal, Intent::Other, 0.9).await.unwrap();
        assert!(matches!(strategy, Strategy::LlmReasoning));
    }

    #[tokio::test]
    async fn falls_back_to_hybrid_for_simple_goals_with_no_match() {
        let store = store();
        let strategy = select_strategy(&store, "ping health", Intent::Other, 0.9).await.unwrap();
        assert!(matches!(strategy, Strategy::Hybrid(_)));
    }
}
