use std::path::Path;
use std::sync::Arc;

use pera_exec::ExecutionEngine;
use pera_memory::{
    EmbeddingProvider, EpisodicLog, HashingEmbeddingProvider, InMemoryEpisodicLog,
    InMemoryKnowledgeStore, InMemoryWorkingStore, KnowledgeStore, WorkingStore,
};
use pera_messaging::{EventBus, TraceRegistry};
use pera_orchestrator::Orchestrator;
use pera_planner::Planner;
use pera_registry::{TaskTypeCategoryMap, ToolRegistry};
use pera_types::config::PeraConfig;
use std::time::Duration;

use crate::demo_tools::{DemoGenerateTool, DemoReasoner, DemoSearchTool};

/// Where the Episodic Log and Knowledge Store persist to. Absent means the
/// in-process, non-durable defaults (`spec.md` §6's "Working Store: ...
/// no durability requirement" extended here to an explicit opt-in for the
/// other two stores as well, since the CLI is as often run against a
/// throwaway session as a long-lived one).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct StoragePaths {
    pub episodic_db_path: Option<String>,
    pub knowledge_db_path: Option<String>,
}

/// The CLI's on-disk configuration file: the shared [`PeraConfig`] plus
/// where durable backends should live.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub pera: PeraConfig,
    pub storage: StoragePaths,
}

impl CliConfig {
    /// Load from a TOML file, or fall back to pure defaults if `path` is
    /// `None` and no default-named file exists in the working directory.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .map_err(|err| anyhow::anyhow!("failed to read {}: {err}", path.display()))?;
                Ok(toml::from_str(&contents)?)
            }
            None => {
                for candidate in ["pera.toml", ".pera.toml"] {
                    if Path::new(candidate).exists() {
                        return Self::load(Some(Path::new(candidate)));
                    }
                }
                Ok(Self::default())
            }
        }
    }
}

/// Every wired-up component a CLI command needs, assembled once per
/// invocation from a [`CliConfig`] (`spec.md` §9's "no process-global
/// mutable state" — everything is threaded through explicitly, here at the
/// CLI's composition root rather than each component's own constructor).
pub struct System {
    pub working: Arc<dyn WorkingStore>,
    pub episodic: Arc<dyn EpisodicLog>,
    pub knowledge: Arc<dyn KnowledgeStore>,
    pub registry: Arc<ToolRegistry>,
    pub bus: Arc<EventBus>,
    pub traces: pera_messaging::SharedTraceRegistry,
    pub orchestrator: Arc<Orchestrator>,
    pub learning: Arc<pera_learning::LearningLoop>,
}

impl System {
    /// Build every component from `config`, registering the demonstration
    /// tools and reasoner (`crate::demo_tools`) and selecting durable
    /// storage backends when `config.storage` names a path.
    pub async fn build(config: &CliConfig) -> anyhow::Result<Self> {
        let working: Arc<dyn WorkingStore> = Arc::new(InMemoryWorkingStore::new(
            10_000,
            config.pera.memory.working.compression_threshold_bytes,
            Duration::from_secs(config.pera.memory.working.timeout_secs),
        ));

        let episodic: Arc<dyn EpisodicLog> = match &config.storage.episodic_db_path {
            Some(path) => {
                Arc::new(pera_storage_sqlite::SqliteEpisodicLog::open_local(path).await?)
            }
            None => Arc::new(InMemoryEpisodicLog::new()),
        };

        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbeddingProvider::default());
        let knowledge: Arc<dyn KnowledgeStore> = match &config.storage.knowledge_db_path {
            Some(path) => Arc::new(
                pera_storage_embedded::RedbKnowledgeStore::open(
                    path,
                    Arc::clone(&embedder),
                    config.pera.planning.similarity_threshold,
                )
                .await?,
            ),
            None => Arc::new(InMemoryKnowledgeStore::new(embedder, config.pera.planning.similarity_threshold)),
        };

        let registry = Arc::new(ToolRegistry::new(TaskTypeCategoryMap::default()));
        registry.register(Arc::new(DemoSearchTool::new()), vec!["web_search".to_string()]);
        registry.register(Arc::new(DemoGenerateTool::new()), vec!["llm".to_string(), "text_generation".to_string()]);

        let engine =
            Arc::new(ExecutionEngine::new(Arc::clone(&registry), config.pera.execution.clone()).with_knowledge(Arc::clone(&knowledge)));
        let planner = Arc::new(
            Planner::new(Arc::clone(&knowledge), config.pera.planning.clone()).with_reasoner(Arc::new(DemoReasoner)),
        );
        let bus = Arc::new(EventBus::new());
        let traces = Arc::new(TraceRegistry::new());

        let learning = Arc::new(pera_learning::LearningLoop::new(
            Arc::clone(&episodic),
            Arc::clone(&knowledge),
            Arc::clone(&bus),
            config.pera.learning.clone(),
        ));

        let learning_scheduler: Arc<dyn pera_orchestrator::LearningScheduler> = learning.clone();
        let orchestrator = Arc::new(
            Orchestrator::new(
                working.clone(),
                episodic.clone(),
                registry.clone(),
                engine,
                planner,
                bus.clone(),
                traces.clone(),
                config.pera.concurrency.clone(),
                env!("CARGO_PKG_VERSION"),
            )
            .with_learning_scheduler(learning_scheduler)
            .with_knowledge(Arc::clone(&knowledge)),
        );

        Ok(Self { working, episodic, knowledge, registry, bus, traces, orchestrator, learning })
    }
}
