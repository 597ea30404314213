//! redb-backed `KnowledgeStore`, grounded in the teacher's
//! `memory-storage-redb::RedbStorage` (`Database::create`, write/read
//! transactions opened per call, synchronous redb work wrapped in
//! `spawn_blocking` with a timeout) and in `pera_memory::InMemoryKnowledgeStore`
//! for the domain logic (validation, filter matching, preference
//! bookkeeping) that this backend must reproduce byte-for-byte so callers
//! can swap between the two without behavior changes.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pera_memory::embedding::{cosine_similarity, EmbeddingProvider};
use pera_memory::error::{Error, Result};
use pera_memory::knowledge::{KnowledgeStore, SkillMatch, SkillPatch};
use pera_types::filters::SkillFilter;
use pera_types::skill::{Preference, Skill, SkillType};
use redb::{Database, ReadableTable};
use serde_json::Value;
use uuid::Uuid;

use crate::tables::{EMBEDDINGS_TABLE, PARAMETER_DEFAULTS_TABLE, PREFERENCES_TABLE, RELATIONS_TABLE, SKILLS_TABLE};

const DB_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

fn backend_err(err: impl std::fmt::Display) -> Error {
    Error::Backend(anyhow::anyhow!("{err}"))
}

async fn with_db_timeout<T, F>(operation: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(DB_OPERATION_TIMEOUT, tokio::task::spawn_blocking(operation)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(backend_err(format!("task join error: {join_err}"))),
        Err(_) => Err(backend_err(format!("database operation timed out after {DB_OPERATION_TIMEOUT:?}"))),
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    postcard::to_allocvec(value).map_err(backend_err)
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    postcard::from_bytes(bytes).map_err(backend_err)
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

/// Durable `KnowledgeStore` over a local redb file.
pub struct RedbKnowledgeStore {
    db: Arc<Database>,
    embedder: Arc<dyn EmbeddingProvider>,
    similarity_threshold: f32,
}

impl RedbKnowledgeStore {
    pub async fn open(path: impl AsRef<Path>, embedder: Arc<dyn EmbeddingProvider>, similarity_threshold: f32) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let db = with_db_timeout(move || Database::create(&path_buf).map_err(backend_err)).await?;
        let db = Arc::new(db);
        Self::initialize_tables(Arc::clone(&db)).await?;
        Ok(Self { db, embedder, similarity_threshold })
    }

    async fn initialize_tables(db: Arc<Database>) -> Result<()> {
        with_db_timeout(move || {
            let write_txn = db.begin_write().map_err(backend_err)?;
            {
                write_txn.open_table(SKILLS_TABLE).map_err(backend_err)?;
                write_txn.open_table(EMBEDDINGS_TABLE).map_err(backend_err)?;
                write_txn.open_table(PREFERENCES_TABLE).map_err(backend_err)?;
                write_txn.open_table(RELATIONS_TABLE).map_err(backend_err)?;
                write_txn.open_table(PARAMETER_DEFAULTS_TABLE).map_err(backend_err)?;
            }
            write_txn.commit().map_err(backend_err)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl KnowledgeStore for RedbKnowledgeStore {
    async fn save_skill(&self, skill: Skill) -> Result<Uuid> {
        validate(&skill)?;
        let id = skill.id;
        let embedding = self.embedder.embed(&skill.embedding_text());
        let skill_bytes = encode(&skill)?;
        let embedding_bytes = encode(&embedding)?;
        let db = Arc::clone(&self.db);

        with_db_timeout(move || {
            let write_txn = db.begin_write().map_err(backend_err)?;
            {
                let mut skills = write_txn.open_table(SKILLS_TABLE).map_err(backend_err)?;
                skills.insert(id.to_string().as_str(), skill_bytes.as_slice()).map_err(backend_err)?;
                let mut embeddings = write_txn.open_table(EMBEDDINGS_TABLE).map_err(backend_err)?;
                embeddings.insert(id.to_string().as_str(), embedding_bytes.as_slice()).map_err(backend_err)?;
            }
            write_txn.commit().map_err(backend_err)?;
            Ok(())
        })
        .await?;
        Ok(id)
    }

    async fn get_skill(&self, id: Uuid) -> Result<Option<Skill>> {
        let db = Arc::clone(&self.db);
        with_db_timeout(move || {
            let read_txn = db.begin_read().map_err(backend_err)?;
            let skills = read_txn.open_table(SKILLS_TABLE).map_err(backend_err)?;
            match skills.get(id.to_string().as_str()).map_err(backend_err)? {
                Some(bytes) => Ok(Some(decode(bytes.value())?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn search_skills(&self, query_text: &str, filters: &SkillFilter, limit: usize) -> Result<Vec<SkillMatch>> {
        let query_embedding = self.embedder.embed(query_text);
        let filters = filters.clone();
        let threshold = self.similarity_threshold;
        let db = Arc::clone(&self.db);

        let mut matches = with_db_timeout(move || {
            let read_txn = db.begin_read().map_err(backend_err)?;
            let skills = read_txn.open_table(SKILLS_TABLE).map_err(backend_err)?;
            let embeddings = read_txn.open_table(EMBEDDINGS_TABLE).map_err(backend_err)?;
            let mut matches = Vec::new();
            for entry in skills.iter().map_err(backend_err)? {
                let (key, bytes) = entry.map_err(backend_err)?;
                let skill: Skill = decode(bytes.value())?;
                if !matches_filter(&skill, &filters) {
                    continue;
                }
                let Some(embedding_bytes) = embeddings.get(key.value()).map_err(backend_err)? else {
                    continue;
                };
                let embedding: Vec<f32> = decode(embedding_bytes.value())?;
                let similarity = cosine_similarity(&query_embedding, &embedding);
                if similarity >= threshold {
                    matches.push(SkillMatch { skill, similarity });
                }
            }
            Ok(matches)
        })
        .await?;

        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn search_by_type(&self, skill_type: SkillType) -> Result<Vec<Skill>> {
        let db = Arc::clone(&self.db);
        with_db_timeout(move || {
            let read_txn = db.begin_read().map_err(backend_err)?;
            let skills = read_txn.open_table(SKILLS_TABLE).map_err(backend_err)?;
            let mut out = Vec::new();
            for entry in skills.iter().map_err(backend_err)? {
                let (_, bytes) = entry.map_err(backend_err)?;
                let skill: Skill = decode(bytes.value())?;
                if skill.skill_type == skill_type {
                    out.push(skill);
                }
            }
            Ok(out)
        })
        .await
    }

    async fn update_skill(&self, id: Uuid, patch: SkillPatch) -> Result<Skill> {
        let embedder = Arc::clone(&self.embedder);
        let db = Arc::clone(&self.db);
        let now = Utc::now();

        with_db_timeout(move || {
            let write_txn = db.begin_write().map_err(backend_err)?;
            let updated = {
                let mut skills = write_txn.open_table(SKILLS_TABLE).map_err(backend_err)?;
                let existing_bytes = skills.get(id.to_string().as_str()).map_err(backend_err)?;
                let Some(existing_bytes) = existing_bytes else {
                    return Err(Error::SkillNotFound(id));
                };
                let mut updated: Skill = decode(existing_bytes.value())?;
                drop(existing_bytes);

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
                updated.updated_at = now;
                validate(&updated)?;

                let embedding = embedder.embed(&updated.embedding_text());
                let skill_bytes = encode(&updated)?;
                let embedding_bytes = encode(&embedding)?;
                skills.insert(id.to_string().as_str(), skill_bytes.as_slice()).map_err(backend_err)?;
                let mut embeddings = write_txn.open_table(EMBEDDINGS_TABLE).map_err(backend_err)?;
                embeddings.insert(id.to_string().as_str(), embedding_bytes.as_slice()).map_err(backend_err)?;
                updated
            };
            write_txn.commit().map_err(backend_err)?;
            Ok(updated)
        })
        .await
    }

    async fn link_skills(&self, a: Uuid, b: Uuid, relation: &str) -> Result<()> {
        let relation = relation.to_string();
        let db = Arc::clone(&self.db);

        with_db_timeout(move || {
            let write_txn = db.begin_write().map_err(backend_err)?;
            {
                let mut skills = write_txn.open_table(SKILLS_TABLE).map_err(backend_err)?;
                if skills.get(a.to_string().as_str()).map_err(backend_err)?.is_none() {
                    return Err(Error::SkillNotFound(a));
                }
                if skills.get(b.to_string().as_str()).map_err(backend_err)?.is_none() {
                    return Err(Error::SkillNotFound(b));
                }
                let existing_bytes = skills.get(a.to_string().as_str()).map_err(backend_err)?.unwrap();
                let mut skill_a: Skill = decode(existing_bytes.value())?;
                drop(existing_bytes);
                if !skill_a.related_skills.contains(&b) {
                    skill_a.related_skills.push(b);
                }
                let skill_bytes = encode(&skill_a)?;
                skills.insert(a.to_string().as_str(), skill_bytes.as_slice()).map_err(backend_err)?;

                let mut relations = write_txn.open_table(RELATIONS_TABLE).map_err(backend_err)?;
                let relation_key = format!("{a}|{b}|{relation}");
                relations.insert(relation_key.as_str(), &[][..]).map_err(backend_err)?;
            }
            write_txn.commit().map_err(backend_err)?;
            Ok(())
        })
        .await
    }

    async fn get_preference(&self, task_type: &str) -> Result<Option<Preference>> {
        let task_type = task_type.to_string();
        let db = Arc::clone(&self.db);
        with_db_timeout(move || {
            let read_txn = db.begin_read().map_err(backend_err)?;
            let preferences = read_txn.open_table(PREFERENCES_TABLE).map_err(backend_err)?;
            match preferences.get(task_type.as_str()).map_err(backend_err)? {
                Some(bytes) => Ok(Some(decode(bytes.value())?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn update_preference(&self, task_type: &str, tool: &str, success: bool, duration_secs: f32) -> Result<Preference> {
        let task_type = task_type.to_string();
        let tool = tool.to_string();
        let db = Arc::clone(&self.db);

        with_db_timeout(move || {
            let write_txn = db.begin_write().map_err(backend_err)?;
            let preference = {
                let mut preferences = write_txn.open_table(PREFERENCES_TABLE).map_err(backend_err)?;
                let mut preference = match preferences.get(task_type.as_str()).map_err(backend_err)? {
                    Some(bytes) => decode(bytes.value())?,
                    None => Preference::new(&task_type, &tool),
                };
                preference.record_sample(success, duration_secs);
                let bytes = encode(&preference)?;
                preferences.insert(task_type.as_str(), bytes.as_slice()).map_err(backend_err)?;
                preference
            };
            write_txn.commit().map_err(backend_err)?;
            Ok(preference)
        })
        .await
    }

    async fn set_preferred_tool(&self, task_type: &str, tool: &str) -> Result<Preference> {
        let task_type = task_type.to_string();
        let tool = tool.to_string();
        let db = Arc::clone(&self.db);

        with_db_timeout(move || {
            let write_txn = db.begin_write().map_err(backend_err)?;
            let preference = Preference::new(&task_type, &tool);
            {
                let mut preferences = write_txn.open_table(PREFERENCES_TABLE).map_err(backend_err)?;
                let bytes = encode(&preference)?;
                preferences.insert(task_type.as_str(), bytes.as_slice()).map_err(backend_err)?;
            }
            write_txn.commit().map_err(backend_err)?;
            Ok(preference)
        })
        .await
    }

    async fn list_all_skills(&self, filters: &SkillFilter, limit: usize) -> Result<Vec<Skill>> {
        let filters = filters.clone();
        let db = Arc::clone(&self.db);
        let mut skills = with_db_timeout(move || {
            let read_txn = db.begin_read().map_err(backend_err)?;
            let table = read_txn.open_table(SKILLS_TABLE).map_err(backend_err)?;
            let mut out = Vec::new();
            for entry in table.iter().map_err(backend_err)? {
                let (_, bytes) = entry.map_err(backend_err)?;
                let skill: Skill = decode(bytes.value())?;
                if matches_filter(&skill, &filters) {
                    out.push(skill);
                }
            }
            Ok(out)
        })
        .await?;
        skills.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        skills.truncate(limit);
        Ok(skills)
    }

    async fn get_parameter_defaults(&self, task_type: &str) -> Result<HashMap<String, Value>> {
        let task_type = task_type.to_string();
        let db = Arc::clone(&self.db);
        with_db_timeout(move || {
            let read_txn = db.begin_read().map_err(backend_err)?;
            let table = read_txn.open_table(PARAMETER_DEFAULTS_TABLE).map_err(backend_err)?;
            match table.get(task_type.as_str()).map_err(backend_err)? {
                Some(bytes) => decode(bytes.value()),
                None => Ok(HashMap::new()),
            }
        })
        .await
    }

    async fn set_parameter_default(&self, task_type: &str, parameter: &str, value: Value) -> Result<()> {
        let task_type = task_type.to_string();
        let parameter = parameter.to_string();
        let db = Arc::clone(&self.db);
        with_db_timeout(move || {
            let write_txn = db.begin_write().map_err(backend_err)?;
            {
                let mut table = write_txn.open_table(PARAMETER_DEFAULTS_TABLE).map_err(backend_err)?;
                let mut defaults: HashMap<String, Value> = match table.get(task_type.as_str()).map_err(backend_err)? {
                    Some(bytes) => decode(bytes.value())?,
                    None => HashMap::new(),
                };
                defaults.insert(parameter, value);
                let bytes = encode(&defaults)?;
                table.insert(task_type.as_str(), bytes.as_slice()).map_err(backend_err)?;
            }
            write_txn.commit().map_err(backend_err)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pera_memory::embedding::HashingEmbeddingProvider;
    use pera_types::skill::{SkillAuthor, SkillStep, SkillVersion};
    use std::collections::HashMap as Map;

    fn sample_skill(name: &str) -> Skill {
        let steps = vec![SkillStep {
            action: "search_web".to_string(),
            parameters: Map::new(),
            required_tools: vec!["web_search".to_string()],
            preconditions: vec![],
        }];
        Skill {
            id: Skill::content_hash_id(name, "searches the web for information", &steps),
            name: name.to_string(),
            skill_type: SkillType::Procedure,
            version: SkillVersion::initial(),
            description: "searches the web for information".to_string(),
            objectives: vec!["find relevant sources".to_string()],
            categories: vec!["research".to_string()],
            steps,
            preconditions: vec![],
            postconditions: vec![],
            performance: Default::default(),
            usage: Default::default(),
            related_skills: vec![],
            dependencies: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            author: SkillAuthor::System,
            estimated_timeout: None,
            resource_estimates: Map::new(),
            embedding: None,
        }
    }

    async fn store() -> (RedbKnowledgeStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.redb");
        let store = RedbKnowledgeStore::open(path, Arc::new(HashingEmbeddingProvider::default()), 0.5).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let (store, _dir) = store().await;
        let skill = sample_skill("web-search");
        let id = store.save_skill(skill.clone()).await.unwrap();
        let fetched = store.get_skill(id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "web-search");
    }

    #[tokio::test]
    async fn empty_steps_are_rejected() {
        let (store, _dir) = store().await;
        let mut skill = sample_skill("broken");
        skill.steps.clear();
        assert!(matches!(store.save_skill(skill).await, Err(Error::InvalidSkill(_))));
    }

    #[tokio::test]
    async fn search_finds_relevant_skill_above_threshold() {
        let (store, _dir) = store().await;
        store.save_skill(sample_skill("web-search")).await.unwrap();
        let results = store.search_skills("search the web", &SkillFilter::default(), 10).await.unwrap();
        assert!(!results.is_empty());
    }

    #[tokio::test]
    async fn update_bumps_major_version_on_step_change() {
        let (store, _dir) = store().await;
        let id = store.save_skill(sample_skill("web-search")).await.unwrap();
        let updated = store
            .update_skill(
                id,
                SkillPatch {
                    steps: Some(vec![SkillStep {
                        action: "search_web_v2".to_string(),
                        parameters: Map::new(),
                        required_tools: vec![],
                        preconditions: vec![],
                    }]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.version, SkillVersion::new(2, 0, 0));
    }

    #[tokio::test]
    async fn link_skills_requires_both_to_exist() {
        let (store, _dir) = store().await;
        let a = store.save_skill(sample_skill("a")).await.unwrap();
        let err = store.link_skills(a, Uuid::new_v4(), "complements").await.unwrap_err();
        assert!(matches!(err, Error::SkillNotFound(_)));
    }

    #[tokio::test]
    async fn preference_accumulates_samples() {
        let (store, _dir) = store().await;
        store.update_preference("search", "web_search", true, 1.0).await.unwrap();
        let pref = store.update_preference("search", "web_search", true, 2.0).await.unwrap();
        assert_eq!(pref.sample_count, 2);
    }

    #[tokio::test]
    async fn set_preferred_tool_replaces_and_resets_samples() {
        let (store, _dir) = store().await;
        store.update_preference("search", "web_search", true, 1.0).await.unwrap();
        let pref = store.set_preferred_tool("search", "better_search").await.unwrap();
        assert_eq!(pref.tool, "better_search");
        assert_eq!(pref.sample_count, 0);
    }

    #[tokio::test]
    async fn parameter_defaults_round_trip_across_reopen() {
        let (store, _dir) = store().await;
        store.set_parameter_default("search", "max_results", serde_json::json!(5)).await.unwrap();
        store.set_parameter_default("search", "region", serde_json::json!("us")).await.unwrap();

        let defaults = store.get_parameter_defaults("search").await.unwrap();
        assert_eq!(defaults.len(), 2);
        assert_eq!(defaults["max_results"], serde_json::json!(5));
    }
}
