use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::metrics::ToolMetrics;

/// Coarse type annotation for a [`Tool`]'s declared parameters, matching
/// `spec.md` §4.2's "parameter schema (name, type annotation, default,
/// required flag)".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Number,
    Bool,
    Object,
    Array,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSchema {
    pub name: String,
    pub type_annotation: ParamType,
    pub default: Option<Value>,
    pub required: bool,
}

impl ParamSchema {
    #[must_use]
    pub fn required(name: impl Into<String>, type_annotation: ParamType) -> Self {
        Self { name: name.into(), type_annotation, default: None, required: true }
    }

    #[must_use]
    pub fn optional(name: impl Into<String>, type_annotation: ParamType, default: Value) -> Self {
        Self { name: name.into(), type_annotation, default: Some(default), required: false }
    }
}

/// Capability bundle a [`Tool`] may depend on (HTTP client handle, LLM
/// client handle, ...), injected at construction time.
///
/// Breaks the cyclic reference a naive design would otherwise have (tools
/// referencing the registry that instantiates them) per the capability
/// interface design note in `spec.md` §9: concrete collaborators (the LLM
/// provider, an HTTP client) are out of scope here (`spec.md` §1) and are
/// reached only through this trait.
pub trait ToolDependencies: Send + Sync {}

/// A concrete tool implementation the execution engine can dispatch to.
///
/// `spec.md` §4.2: "A tool exposes: name, version, parameter schema,
/// execute(params) which is either blocking or suspendable, and exposes
/// running metrics."
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    fn parameter_schema(&self) -> Vec<ParamSchema>;

    /// Whether this tool's `execute` should be awaited directly
    /// (suspendable, e.g. an async HTTP call) or offloaded to a worker pool
    /// (blocking, e.g. a CPU-bound local computation). Drives §4.3 step 3's
    /// dispatch choice in the execution engine.
    fn is_blocking(&self) -> bool {
        false
    }

    /// Execute the tool. Implementations should return `Err` for any
    /// failure rather than panicking; the execution engine classifies the
    /// error string against its pattern table.
    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<Value>;

    fn metrics(&self) -> &ToolMetrics;
}

/// Outcome of one `execute` call, with timing and error captured uniformly
/// regardless of whether the tool succeeded, errored, or (from the
/// execution engine's perspective) timed out.
#[derive(Debug, Clone)]
pub struct SafeExecutionResult {
    pub success: bool,
    pub value: Option<Value>,
    pub duration: Duration,
    pub error: Option<String>,
    pub tool_name: String,
}

/// Run `tool.execute(params)`, timing it and atomically updating the
/// tool's metrics regardless of outcome. Never panics: any error the tool
/// returns becomes a `SafeExecutionResult { success: false, .. }`.
pub async fn execute_safely(tool: &dyn Tool, params: HashMap<String, Value>) -> SafeExecutionResult {
    let start = Instant::now();
    let outcome = tool.execute(params).await;
    let duration = start.elapsed();

    match outcome {
        Ok(value) => {
            tool.metrics().record(true, duration);
            SafeExecutionResult {
                success: true,
                value: Some(value),
                duration,
                error: None,
                tool_name: tool.name().to_string(),
            }
        }
        Err(err) => {
            tool.metrics().record(false, duration);
            SafeExecutionResult {
                success: false,
                value: None,
                duration,
                error: Some(err.to_string()),
                tool_name: tool.name().to_string(),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A minimal `Tool` used across this crate's unit tests: echoes back
    /// its `value` parameter, or returns an error if `fail` is set.
    pub struct EchoTool {
        name: String,
        metrics: ToolMetrics,
    }

    impl EchoTool {
        pub fn new(name: impl Into<String>) -> Self {
            Self { name: name.into(), metrics: ToolMetrics::new() }
        }
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn version(&self) -> &str {
            "1.0.0"
        }

        fn parameter_schema(&self) -> Vec<ParamSchema> {
            vec![ParamSchema::required("value", ParamType::String)]
        }

        async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<Value> {
            if params.get("fail").and_then(Value::as_bool).unwrap_or(false) {
                anyhow::bail!("connection refused");
            }
            Ok(params.get("value").cloned().unwrap_or(Value::Null))
        }

        fn metrics(&self) -> &ToolMetrics {
            &self.metrics
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::EchoTool;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn safe_execution_records_success() {
        let tool = EchoTool::new("echo");
        let mut params = HashMap::new();
        params.insert("value".to_string(), json!("hello"));
        let result = execute_safely(&tool, params).await;
        assert!(result.success);
        assert_eq!(result.value, Some(json!("hello")));
        assert_eq!(tool.metrics().snapshot().total, 1);
    }

    #[tokio::test]
    async fn safe_execution_records_failure_without_panicking() {
        let tool = EchoTool::new("echo");
        let mut params = HashMap::new();
        params.insert("fail".to_string(), json!(true));
        let result = execute_safely(&tool, params).await;
        assert!(!result.success);
        assert!(result.error.is_some());
        assert_eq!(tool.metrics().snapshot().failures, 1);
    }
}
