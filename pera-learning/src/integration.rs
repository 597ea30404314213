//! Skill integration (`spec.md` §4.6 steps 6–7): commit accepted procedure
//! candidates to the Knowledge Store, serialized by a write lock so two
//! concurrent learning cycles never race each other's near-duplicate
//! check, then apply any preference switch the tool-performance analysis
//! recommends.

use std::sync::Arc;

use pera_memory::{KnowledgeStore, SkillPatch};
use pera_types::skill::{Skill, SkillAuthor, SkillType, SkillVersion, UsageStats};
use uuid::Uuid;

use crate::abstraction::ProcedureCandidate;
use crate::error::Result;
use crate::tool_performance::TaskTypeReport;

const NEAR_DUPLICATE_SIMILARITY: f64 = 0.85;

fn quality_of(skill: &Skill) -> f64 {
    skill
        .resource_estimates
        .get("quality_score")
        .and_then(serde_json::Value::as_f64)
        .unwrap_or_else(|| f64::from(skill.success_rate()))
}

/// Integrate one candidate procedure: if an existing skill's name is a
/// near-duplicate (`strsim::jaro_winkler` above 0.85) and the candidate's
/// quality is higher, supersede it (tag the old skill `archived`, link
/// `new -> supersedes -> old`); otherwise insert the candidate fresh.
/// Callers must hold `write_lock` for the duration of this call (`spec.md`
/// §4.6 step 6's "serialized by a Knowledge Store write lock").
pub async fn integrate_candidate(knowledge: &Arc<dyn KnowledgeStore>, candidate: &ProcedureCandidate) -> Result<Uuid> {
    let existing = knowledge.search_by_type(SkillType::Procedure).await?;
    let near_duplicate = existing
        .iter()
        .map(|skill| (skill, strsim::jaro_winkler(&skill.name, &candidate.name)))
        .filter(|(_, similarity)| *similarity >= NEAR_DUPLICATE_SIMILARITY)
        .max_by(|(_, a), (_, b)| a.total_cmp(b));

    let mut resource_estimates = std::collections::HashMap::new();
    resource_estimates.insert("quality_score".to_string(), serde_json::json!(candidate.quality));

    let new_skill = Skill {
        id: Skill::content_hash_id(&candidate.name, &candidate.objective, &candidate.steps),
        name: candidate.name.clone(),
        skill_type: SkillType::Procedure,
        version: SkillVersion::initial(),
        description: candidate.objective.clone(),
        objectives: vec![candidate.objective.clone()],
        categories: vec!["learned".to_string()],
        steps: candidate.steps.clone(),
        preconditions: Vec::new(),
        postconditions: Vec::new(),
        performance: Default::default(),
        usage: UsageStats::default(),
        related_skills: Vec::new(),
        dependencies: Vec::new(),
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
        author: SkillAuthor::System,
        estimated_timeout: None,
        resource_estimates,
        embedding: None,
    };

    match near_duplicate {
        Some((old, _similarity)) if quality_of(old) < f64::from(candidate.quality) => {
            let old_id = old.id;
            let new_id = knowledge.save_skill(new_skill).await?;
            knowledge.link_skills(new_id, old_id, "supersedes").await?;
            let mut categories = old.categories.clone();
            if !categories.iter().any(|c| c == "archived") {
                categories.push("archived".to_string());
            }
            knowledge.update_skill(old_id, SkillPatch { categories: Some(categories), ..Default::default() }).await?;
            Ok(new_id)
        }
        Some((old, _similarity)) => Ok(old.id),
        None => knowledge.save_skill(new_skill).await,
    }
}

/// Apply `report`'s proposed best tool for its task-type if it differs
/// from the current preference and the composite-score improvement
/// clears `improvement_threshold` (`spec.md` §4.6 step 7).
pub async fn apply_preference_update(
    knowledge: &Arc<dyn KnowledgeStore>,
    report: &TaskTypeReport,
    improvement_threshold: f32,
) -> Result<bool> {
    let Some(proposed) = &report.best_tool else { return Ok(false) };
    let Some(proposed_stat) = report.ranked.iter().find(|s| &s.tool == proposed) else { return Ok(false) };

    let current = knowledge.get_preference(&report.task_type).await?;
    let should_apply = match &current {
        None => true,
        Some(pref) if &pref.tool == proposed => false,
        Some(pref) => proposed_stat.composite_score - pref.composite_score() >= improvement_threshold,
    };

    if should_apply {
        knowledge.set_preferred_tool(&report.task_type, proposed).await?;
    }
    Ok(should_apply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pera_memory::{EmbeddingProvider, HashingEmbeddingProvider, InMemoryKnowledgeStore};

    fn candidate(name: &str, quality: f32) -> ProcedureCandidate {
        ProcedureCandidate {
            name: name.to_string(),
            objective: "find the weather".to_string(),
            steps: vec![pera_types::skill::SkillStep {
                action: "search".to_string(),
                parameters: Default::default(),
                required_tools: vec![],
                preconditions: vec![],
            }],
            source_episode_ids: vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()],
            quality,
        }
    }

    fn store() -> Arc<dyn KnowledgeStore> {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbeddingProvider::new(64));
        Arc::new(InMemoryKnowledgeStore::new(embedder, 0.1))
    }

    #[tokio::test]
    async fn a_novel_candidate_is_inserted_fresh() {
        let knowledge = store();
        let id = integrate_candidate(&knowledge, &candidate("procedure-search-then-summarize-fast", 0.8))
            .await
            .unwrap();
        assert!(knowledge.get_skill(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn a_higher_quality_near_duplicate_supersedes_the_old_one() {
        let knowledge = store();
        let old_id = integrate_candidate(&knowledge, &candidate("procedure-search-then-summarize-fast", 0.62)).await.unwrap();
        let new_id =
            integrate_candidate(&knowledge, &candidate("procedure-search-then-summarize-fasts", 0.9)).await.unwrap();
        assert_ne!(old_id, new_id);
        let old_skill = knowledge.get_skill(old_id).await.unwrap().unwrap();
        assert!(old_skill.categories.iter().any(|c| c == "archived"));
    }

    #[tokio::test]
    async fn preference_applies_only_past_the_improvement_threshold() {
        let knowledge = store();
        knowledge.update_preference("search", "web_search", true, 5.0).await.unwrap();

        let report = TaskTypeReport {
            task_type: "search".to_string(),
            ranked: vec![crate::tool_performance::ToolStatSummary {
                tool: "better_search".to_string(),
                success_rate: 0.95,
                mean_duration_secs: 1.0,
                composite_score: 0.99,
                sample_count: 20,
            }],
            best_tool: Some("better_search".to_string()),
            top_two_significance: None,
        };

        let applied = apply_preference_update(&knowledge, &report, 0.1).await.unwrap();
        assert!(applied);
        let pref = knowledge.get_preference("search").await.unwrap().unwrap();
        assert_eq!(pref.tool, "better_search");
    }
}
