//! Reference [`Tool`] implementations registered by default.
//!
//! `spec.md` §1 puts concrete tool implementations (web search, HTTP
//! client, text generation) out of scope, specifying only the `Tool`
//! trait's contract (§4.2) and the `LlmReasoner` trait `pera-planner`
//! depends on. The CLI still needs *something* registered so `pera goal
//! submit` has a runnable end-to-end path without a network-backed
//! provider wired in; these tools are a deterministic, local stand-in for
//! that out-of-scope collaborator, not a production tool suite.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use pera_registry::{ParamSchema, ParamType, Tool, ToolMetrics};
use pera_planner::LlmReasoner;
use serde_json::Value;

/// Echoes its `query` parameter back as a canned "result", after a short
/// simulated latency.
pub struct DemoSearchTool {
    metrics: ToolMetrics,
}

impl DemoSearchTool {
    #[must_use]
    pub fn new() -> Self {
        Self { metrics: ToolMetrics::new() }
    }
}

impl Default for DemoSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for DemoSearchTool {
    fn name(&self) -> &str {
        "demo_search"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn parameter_schema(&self) -> Vec<ParamSchema> {
        vec![ParamSchema::required("query", ParamType::String)]
    }

    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<Value> {
        let query = params.get("query").and_then(Value::as_str).unwrap_or("");
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(Value::String(format!(
            "three results found for '{query}': an overview page, a reference entry, and a recent article"
        )))
    }

    fn metrics(&self) -> &ToolMetrics {
        &self.metrics
    }
}

/// Summarizes/generates text from a `prompt` parameter. Blocking, since a
/// local text-generation pass is CPU-bound rather than an awaited I/O call
/// (`spec.md` §4.2's "execute(params) which is either blocking or
/// suspendable").
pub struct DemoGenerateTool {
    metrics: ToolMetrics,
}

impl DemoGenerateTool {
    #[must_use]
    pub fn new() -> Self {
        Self { metrics: ToolMetrics::new() }
    }
}

impl Default for DemoGenerateTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for DemoGenerateTool {
    fn name(&self) -> &str {
        "demo_generate"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn parameter_schema(&self) -> Vec<ParamSchema> {
        vec![ParamSchema::required("prompt", ParamType::String)]
    }

    fn is_blocking(&self) -> bool {
        true
    }

    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<Value> {
        let prompt = params.get("prompt").and_then(Value::as_str).unwrap_or("");
        Ok(Value::String(format!("summary: {}", prompt.chars().take(160).collect::<String>())))
    }

    fn metrics(&self) -> &ToolMetrics {
        &self.metrics
    }
}

/// A deterministic [`LlmReasoner`] stand-in: turns any goal text it
/// hasn't seen a matching skill for into a two-task search-then-summarize
/// plan, so the hybrid/LLM-reasoning strategies have something to fall
/// back on outside of tests.
pub struct DemoReasoner;

#[async_trait]
impl LlmReasoner for DemoReasoner {
    async fn generate(&self, prompt: &str, _temperature: f32, _max_tokens: u32) -> anyhow::Result<String> {
        let goal_line = prompt.lines().find(|l| l.starts_with("Goal: ")).unwrap_or("Goal: the stated goal");
        let goal_text = goal_line.trim_start_matches("Goal: ");
        Ok(format!(
            r#"```json
{{"objective": "{goal_text}", "tasks": [
  {{"id": "t1", "description": "search for relevant information", "task_type": "search", "tool": null, "parameters": {{"query": "{goal_text}"}}, "dependencies": []}},
  {{"id": "t2", "description": "summarize the findings", "task_type": "generate", "tool": null, "parameters": {{"prompt": "summarize: {goal_text}"}}, "dependencies": ["t1"]}}
], "resource_requirements": {{}}, "constraints": []}}
```"#
        ))
    }
}
