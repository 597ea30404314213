use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use pera_types::filters::SkillFilter;
use pera_types::skill::{Preference, Skill};
use serde_json::Value;
use uuid::Uuid;

use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct SkillMatch {
    pub skill: Skill,
    pub similarity: f32,
}

/// Durable store of Skills and Preferences, vector-indexed for semantic
/// search (`spec.md` §4.1).
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn save_skill(&self, skill: Skill) -> Result<Uuid>;
    async fn get_skill(&self, id: Uuid) -> Result<Option<Skill>>;
    async fn search_skills(&self, query_text: &str, filters: &SkillFilter, limit: usize) -> Result<Vec<SkillMatch>>;
    async fn search_by_type(&self, skill_type: pera_types::skill::SkillType) -> Result<Vec<Skill>>;
    async fn update_skill(&self, id: Uuid, patch: SkillPatch) -> Result<Skill>;
    async fn link_skills(&self, a: Uuid, b: Uuid, relation: &str) -> Result<()>;
    async fn get_preference(&self, task_type: &str) -> Result<Option<Preference>>;
    async fn update_preference(&self, task_type: &str, tool: &str, success: bool, duration_secs: f32) -> Result<Preference>;
    /// Force `task_type`'s preferred tool to switch, discarding accumulated
    /// samples for whichever tool held the slot before. Distinct from
    /// `update_preference`, which only ever accumulates a sample under the
    /// tool already on record: the learning loop's preference-update step
    /// (`spec.md` §4.6 step 7) proposes a *different* tool outright, which
    /// `update_preference` has no way to express.
    async fn set_preferred_tool(&self, task_type: &str, tool: &str) -> Result<Preference>;
    async fn list_all_skills(&self, filters: &SkillFilter, limit: usize) -> Result<Vec<Skill>>;
    /// Every stored per-parameter default for `task_type`, keyed by
    /// parameter name. The Planner's Optimization step merges these into
    /// a freshly decomposed task's parameters before validation
    /// (`spec.md` §4.4 step 5), filling only parameters the task didn't
    /// already set.
    async fn get_parameter_defaults(&self, task_type: &str) -> Result<HashMap<String, Value>>;
    async fn set_parameter_default(&self, task_type: &str, parameter: &str, value: Value) -> Result<()>;
}

/// Partial update applied by `update_skill`, always producing a new
/// [`pera_types::skill::SkillVersion`] rather than mutating in place.
#[derive(Debug, Clone, Default)]
pub struct SkillPatch {
    pub description: Option<String>,
    pub steps: Option<Vec<pera_types::skill::SkillStep>>,
    pub categories: Option<Vec<String>>,
}

struct Inner {
    skills: HashMap<Uuid, Skill>,
    embeddings: HashMap<Uuid, Vec<f32>>,
    relations: Vec<(Uuid, Uuid, String)>,
    preferences: HashMap<String, Preference>,
    parameter_defaults: HashMap<String, HashMap<String, Value>>,
}

/// In-process `KnowledgeStore`, grounded in the teacher's
/// `StorageBackend`/retrieval-cache pattern: a single reader-preferring lock
/// (`parking_lot::RwLock`, matching the data model's "readers concurrent,
/// writers serialize" shared-resource rule) guards the whole table, since
/// skill volume is expected to stay small enough that brute-force cosine
/// scan over all embeddings is cheap.
pub struct InMemoryKnowledgeStore {
    inner: RwLock<Inner>,
    embedder: Arc<dyn EmbeddingProvider>,
    similarity_threshold: f32,
}

impl InMemoryKnowledgeStore {
    #[must_use]
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, similarity_threshold: f32) -> Self {
        Self {
            inner: RwLock::new(Inner {
                skills: HashMap::new(),
                embeddings: HashMap::new(),
                relations: Vec::new(),
                preferences: HashMap::new(),
                parameter_defaults: HashMap::new(),
            }),
            embedder,
            similarity_threshold,
        }
    }

    fn validate(skill: &Skill) -> Result<()> {
        if skill.name.trim().is_empty() || skill.description.trim().is_empty() {
            return Err(Error::InvalidSkill("name and description are required".to_string()));
        }
        if skill.steps.is_empty() {
            return Err(Error::InvalidSkill("skill must have at least one step".to_string()));
        }
        Ok(())
    }

    fn matches_filter(skill: &Skill, filters: &SkillFilter) -> bool {
        if let Some(skill_type) = filters.skill_type {
            if skill.skill_type != skill_type {
                return false;
            }
        }
        if let Some(category) = &filters.category {
            if !skill.categories.iter().any(|c| c == category) {
                return false;
            }
        }
        if let Some(min) = filters.min_success_rate {
            if skill.success_rate() < min {
                return false;
            }
        }
        true
    }

    /// Background optimizer pass: evicts skills unused beyond `max_age_days`
    /// and re-derives every remaining embedding, per `spec.md` §4.1's
    /// "background optimizer ... removes skills unused beyond the
    /// configured age, re-indexes embeddings" description.
    pub fn run_optimizer(&self, max_age_days: i64) {
        let now = Utc::now();
        let mut inner = self.inner.write();
        let stale: Vec<Uuid> = inner
            .skills
            .values()
            .filter(|s| s.is_stale(now, max_age_days))
            .map(|s| s.id)
            .collect();
        for id in &stale {
            inner.skills.remove(id);
            inner.embeddings.remove(id);
        }
        let embedder = Arc::clone(&self.embedder);
        let re_embeds: Vec<(Uuid, Vec<f32>)> = inner
            .skills
            .values()
            .map(|s| (s.id, embedder.embed(&s.embedding_text())))
            .collect();
        for (id, embedding) in re_embeds {
            inner.embeddings.insert(id, embedding);
        }
        if !stale.is_empty() {
            tracing::info!(evicted = stale.len(), "knowledge store optimizer evicted stale skills");
        }
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn save_skill(&self, skill: Skill) -> Result<Uuid> {
        Self::validate(&skill)?;
        let embedding = self.embedder.embed(&skill.embedding_text());
        let id = skill.id;
        let mut inner = self.inner.write();
        inner.embeddings.insert(id, embedding);
        inner.skills.insert(id, skill);
        Ok(id)
    }

    async fn get_skill(&self, id: Uuid) -> Result<Option<Skill>> {
        Ok(self.inner.read().skills.get(&id).cloned())
    }

    async fn search_skills(&self, query_text: &str, filters: &SkillFilter, limit: usize) -> Result<Vec<SkillMatch>> {
        let query_embedding = self.embedder.embed(query_text);
        let inner = self.inner.read();
        let mut matches: Vec<SkillMatch> = inner
            .skills
            .values()
            .filter(|s| Self::matches_filter(s, filters))
            .filter_map(|skill| {
                let embedding = inner.embeddings.get(&skill.id)?;
                let similarity = cosine_similarity(&query_embedding, embedding);
                (similarity >= self.similarity_threshold).then(|| SkillMatch { skill: skill.clone(), similarity })
            })
            .collect();
        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn search_by_type(&self, skill_type: pera_types::skill::SkillType) -> Result<Vec<Skill>> {
        Ok(self.inner.read().skills.values().filter(|s| s.skill_type == skill_type).cloned().collect())
    }

    async fn update_skill(&self, id: Uuid, patch: SkillPatch) -> Result<Skill> {
        let mut inner = self.inner.write();
        let Some(existing) = inner.skills.get(&id).cloned() else {
            return Err(Error::SkillNotFound(id));
        };
        let mut updated = existing;
        let steps_changed = patch.steps.is_some();
        if let Some(description) = patch.description {
            updated.description = description;
        }
        if let Some(steps) = patch.steps {
            updated.steps = steps;
        }
        if let Some(categories) = patch.categories {
            updated.categories = categories;
        }
        updated.version = if steps_changed { updated.version.bump_major() } else { updated.version.bump_minor() };
        updated.updated_at = Utc::now();
        Self::validate(&updated)?;
        let embedding = self.embedder.embed(&updated.embedding_text());
        inner.embeddings.insert(id, embedding);
        inner.skills.insert(id, updated.clone());
        Ok(updated)
    }

    async fn link_skills(&self, a: Uuid, b: Uuid, relation: &str) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.skills.contains_key(&a) {
            return Err(Error::SkillNotFound(a));
        }
        if !inner.skills.contains_key(&b) {
            return Err(Error::SkillNotFound(b));
        }
        inner.relations.push((a, b, relation.to_string()));
        if let Some(skill) = inner.skills.get_mut(&a) {
            if !skill.related_skills.contains(&b) {
                skill.related_skills.push(b);
            }
        }
        Ok(())
    }

    async fn get_preference(&self, task_type: &str) -> Result<Option<Preference>> {
        Ok(self.inner.read().preferences.get(task_type).cloned())
    }

    async fn update_preference(&self, task_type: &str, tool: &str, success: bool, duration_secs: f32) -> Result<Preference> {
        let mut inner = self.inner.write();
        let preference = inner
            .preferences
            .entry(task_type.to_string())
            .or_insert_with(|| Preference::new(task_type, tool));
        preference.record_sample(success, duration_secs);
        Ok(preference.clone())
    }

    async fn set_preferred_tool(&self, task_type: &str, tool: &str) -> Result<Preference> {
        let mut inner = self.inner.write();
        let preference = Preference::new(task_type, tool);
        inner.preferences.insert(task_type.to_string(), preference.clone());
        Ok(preference)
    }

    async fn list_all_skills(&self, filters: &SkillFilter, limit: usize) -> Result<Vec<Skill>> {
        let inner = self.inner.read();
        let mut skills: Vec<Skill> =
            inner.skills.values().filter(|s| Self::matches_filter(s, filters)).cloned().collect();
        skills.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        skills.truncate(limit);
        Ok(skills)
    }

    async fn get_parameter_defaults(&self, task_type: &str) -> Result<HashMap<String, Value>> {
        Ok(self.inner.read().parameter_defaults.get(task_type).cloned().unwrap_or_default())
    }

    async fn set_parameter_default(&self, task_type: &str, parameter: &str, value: Value) -> Result<()> {
        let mut inner = self.inner.write();
        inner.parameter_defaults.entry(task_type.to_string()).or_default().insert(parameter.to_string(), value);
        Ok(())
    }
}
