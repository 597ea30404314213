use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::tool::Tool;

/// One candidate returned by `list_by_task_type`, carrying the fitness
/// score the planner's "auto" tool selection and the execution engine's
/// dispatch step rank candidates by.
#[derive(Clone)]
pub struct RankedTool {
    pub tool: Arc<dyn Tool>,
    pub fitness: f32,
}

/// Maps task-types to the tool categories that serve them, grounded in
/// `original_source/src/herramientas/registro.py`'s `mapeo_tareas` table.
/// Deployments extend this at construction time rather than the registry
/// hardcoding it, since new task-types/categories are expected to be added
/// without a crate release (`spec.md` §3's `TaskType::Custom`).
pub struct TaskTypeCategoryMap {
    categories: HashMap<String, Vec<String>>,
}

impl TaskTypeCategoryMap {
    #[must_use]
    pub fn new() -> Self {
        Self { categories: HashMap::new() }
    }

    #[must_use]
    pub fn with(mut self, task_type: impl Into<String>, categories: Vec<String>) -> Self {
        self.categories.insert(task_type.into(), categories);
        self
    }

    #[must_use]
    pub fn categories_for(&self, task_type: &str) -> &[String] {
        self.categories.get(task_type).map_or(&[][..], Vec::as_slice)
    }
}

impl Default for TaskTypeCategoryMap {
    /// The default mapping used unless a deployment overrides it,
    /// following the original's `busqueda`/`generacion`/`procesamiento`/
    /// `comunicacion` groupings.
    fn default() -> Self {
        Self::new()
            .with("search", vec!["web_search".to_string(), "http".to_string()])
            .with("generate", vec!["llm".to_string(), "text_generation".to_string()])
            .with("analyze", vec!["analysis".to_string(), "data_processing".to_string()])
            .with("call", vec!["api".to_string(), "http".to_string()])
            .with("summarize", vec!["llm".to_string(), "text_generation".to_string()])
    }
}

struct Inner {
    tools: HashMap<String, Arc<dyn Tool>>,
    categories: HashMap<String, Vec<String>>,
}

/// Discovers, instantiates (by registration, not by a live `importlib`
/// scan — the teacher's `StorageBackend` registration pattern, generalized
/// to tools), and groups tools by category, then ranks candidates for a
/// task-type by fitness (`spec.md` §4.2).
pub struct ToolRegistry {
    inner: RwLock<Inner>,
    task_type_categories: TaskTypeCategoryMap,
}

impl ToolRegistry {
    #[must_use]
    pub fn new(task_type_categories: TaskTypeCategoryMap) -> Self {
        Self {
            inner: RwLock::new(Inner { tools: HashMap::new(), categories: HashMap::new() }),
            task_type_categories,
        }
    }

    pub fn register(&self, tool: Arc<dyn Tool>, categories: Vec<String>) {
        let mut inner = self.inner.write();
        let name = tool.name().to_string();
        if inner.tools.contains_key(&name) {
            tracing::warn!(tool = %name, "tool already registered, overwriting");
        }
        for category in &categories {
            let bucket = inner.categories.entry(category.clone()).or_default();
            if !bucket.contains(&name) {
                bucket.push(name.clone());
            }
        }
        inner.tools.insert(name, tool);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.inner.read().tools.get(name).cloned()
    }

    /// Every registered tool's name, used by callers (the orchestrator's
    /// plan validation) that need the full known-tools set rather than one
    /// category or task-type's candidates.
    #[must_use]
    pub fn tool_names(&self) -> std::collections::HashSet<String> {
        self.inner.read().tools.keys().cloned().collect()
    }

    #[must_use]
    pub fn list_by_category(&self, category: &str) -> Vec<Arc<dyn Tool>> {
        let inner = self.inner.read();
        inner
            .categories
            .get(category)
            .map(|names| names.iter().filter_map(|n| inner.tools.get(n).cloned()).collect())
            .unwrap_or_default()
    }

    /// Rank tools serving `task_type` by fitness: base category fit (0.5),
    /// a ±0.3 band proportional to `(success_rate - 0.5)`, and a +0.1
    /// experience bonus once a tool has logged at least 10 successful
    /// executions (`spec.md` §4.2, grounded in
    /// `original_source/src/herramientas/registro.py::_calcular_idoneidad`).
    #[must_use]
    pub fn list_by_task_type(&self, task_type: &str) -> Vec<RankedTool> {
        let inner = self.inner.read();
        let mut seen = std::collections::HashSet::new();
        let mut ranked: Vec<RankedTool> = self
            .task_type_categories
            .categories_for(task_type)
            .iter()
            .flat_map(|category| inner.categories.get(category).into_iter().flatten())
            .filter(|name| seen.insert((*name).clone()))
            .filter_map(|name| inner.tools.get(name).cloned())
            .map(|tool| {
                let snapshot = tool.metrics().snapshot();
                let mut fitness = 0.5 + (snapshot.success_rate() - 0.5) * 0.3;
                if snapshot.successful_executions() >= 10 {
                    fitness += 0.1;
                }
                RankedTool { tool, fitness: fitness.clamp(0.0, 1.0) }
            })
            .collect();

        ranked.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
        ranked
    }

    /// Top-ranked tool for a task-type, or [`Error::NoToolForTaskType`] if
    /// no candidate exists — the execution engine's "auto" resolution path
    /// (`spec.md` §4.3 step 2).
    pub fn best_for_task_type(&self, task_type: &str) -> Result<Arc<dyn Tool>> {
        self.list_by_task_type(task_type)
            .into_iter()
            .next()
            .map(|ranked| ranked.tool)
            .ok_or_else(|| Error::NoToolForTaskType(task_type.to_string()))
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.get(name).ok_or_else(|| Error::ToolNotFound(name.to_string()))
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(TaskTypeCategoryMap::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::test_support::EchoTool;
    use std::time::Duration;

    #[test]
    fn tool_names_reflects_registrations() {
        let registry = ToolRegistry::default();
        registry.register(Arc::new(EchoTool::new("a")), vec!["web_search".to_string()]);
        registry.register(Arc::new(EchoTool::new("b")), vec!["llm".to_string()]);
        let names = registry.tool_names();
        assert!(names.contains("a") && names.contains("b"));
    }

    #[test]
    fn register_then_get_round_trips() {
        let registry = ToolRegistry::default();
        let tool = Arc::new(EchoTool::new("web_search_tool"));
        registry.register(tool, vec!["web_search".to_string()]);
        assert!(registry.get("web_search_tool").is_some());
    }

    #[test]
    fn unknown_tool_errors() {
        let registry = ToolRegistry::default();
        assert!(matches!(registry.resolve("nope"), Err(Error::ToolNotFound(_))));
    }

    #[test]
    fn ranking_favors_higher_success_rate() {
        let registry = ToolRegistry::default();
        let good = Arc::new(EchoTool::new("good_search"));
        let bad = Arc::new(EchoTool::new("bad_search"));
        for _ in 0..20 {
            good.metrics().record(true, Duration::from_millis(10));
        }
        for _ in 0..20 {
            bad.metrics().record(false, Duration::from_millis(10));
        }
        registry.register(good, vec!["web_search".to_string()]);
        registry.register(bad, vec!["web_search".to_string()]);

        let ranked = registry.list_by_task_type("search");
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].tool.name(), "good_search");
        assert!(ranked[0].fitness > ranked[1].fitness);
    }

    #[test]
    fn experience_bonus_applies_past_ten_successes() {
        let registry = ToolRegistry::default();
        let tool = Arc::new(EchoTool::new("seasoned"));
        for _ in 0..11 {
            tool.metrics().record(true, Duration::from_millis(5));
        }
        registry.register(tool, vec!["web_search".to_string()]);
        let ranked = registry.list_by_task_type("search");
        // success_rate=1.0 -> 0.5 + 0.5*0.3 = 0.65, plus 0.1 bonus = 0.75
        assert!((ranked[0].fitness - 0.75).abs() < 1e-6);
    }

    #[test]
    fn no_tool_for_unmapped_task_type_errors() {
        let registry = ToolRegistry::default();
        assert!(matches!(
            registry.best_for_task_type("never_mapped"),
            Err(Error::NoToolForTaskType(_))
        ));
    }
}
