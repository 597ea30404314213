use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// The LLM collaborator (`spec.md` §6): specified here, not implemented —
/// a concrete provider (HTTP client to a hosted model) is out of this
/// workspace's scope per `spec.md` §1, reached only through this trait
/// (the capability-interface pattern `ToolDependencies` already uses in
/// `pera-registry`).
#[async_trait]
pub trait LlmReasoner: Send + Sync {
    async fn generate(&self, prompt: &str, temperature: f32, max_tokens: u32) -> anyhow::Result<String>;
}

/// Strict output schema the LLM-reasoning prompt demands, mirroring
/// `spec.md` §4.4's "objective, tasks[], resource requirements,
/// constraints".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonedPlan {
    pub objective: String,
    pub tasks: Vec<ReasonedTask>,
    #[serde(default)]
    pub resource_requirements: serde_json::Map<String, Value>,
    #[serde(default)]
    pub constraints: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonedTask {
    pub id: String,
    pub description: String,
    pub task_type: String,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub parameters: serde_json::Map<String, Value>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

const REASONING_TEMPERATURE: f32 = 0.1;
const REASONING_MAX_TOKENS: u32 = 2048;

/// Build the deterministic prompt embedding goal text, intent tag,
/// entities, context, and the strict JSON schema (`spec.md` §4.4).
#[must_use]
pub fn build_prompt(goal_text: &str, intent_tag: &str, context: &serde_json::Map<String, Value>) -> String {
    format!(
        "Decompose the following goal into a structured task plan.\n\
         Goal: {goal_text}\n\
         Intent: {intent_tag}\n\
         Context: {}\n\
         Respond with a single fenced JSON code block matching exactly this schema:\n\
         {{\"objective\": string, \"tasks\": [{{\"id\": string, \"description\": string, \
         \"task_type\": string, \"tool\": string|null, \"parameters\": object, \"dependencies\": [string]}}], \
         \"resource_requirements\": object, \"constraints\": [string]}}",
        Value::Object(context.clone()),
    )
}

/// Invoke the reasoner at the fixed deterministic temperature and parse its
/// response into a [`ReasonedPlan`], extracting JSON from a fenced code
/// block or the first balanced `{...}` run if no fence is present
/// (`spec.md` §4.4: "reject if parse fails").
pub async fn reason(reasoner: &dyn LlmReasoner, prompt: &str) -> Result<ReasonedPlan> {
    let raw = reasoner
        .generate(prompt, REASONING_TEMPERATURE, REASONING_MAX_TOKENS)
        .await
        .map_err(|err| Error::Llm(err.to_string()))?;
    let json_text = extract_json(&raw).ok_or_else(|| Error::Llm("no JSON found in response".to_string()))?;
    serde_json::from_str(&json_text).map_err(|err| Error::Llm(format!("invalid plan JSON: {err}")))
}

/// Extract a JSON payload from a fenced ```json code block, or, failing
/// that, the first balanced brace run in the text.
#[must_use]
pub fn extract_json(text: &str) -> Option<String> {
    if let Some(start) = text.find("```") {
        let after_fence = &text[start + 3..];
        let after_fence = after_fence.strip_prefix("json").unwrap_or(after_fence);
        if let Some(end) = after_fence.find("```") {
            return Some(after_fence[..end].trim().to_string());
        }
    }

    let mut depth = 0i32;
    let mut start_idx = None;
    for (idx, ch) in text.char_indices() {
        match ch {
            '{' => {
                if depth == 0 {
                    start_idx = Some(idx);
                }
                depth += 1;
            }
            '}' => {
                depth -= 1;
                if depth == 0 {
                    if let Some(start) = start_idx {
                        return Some(text[start..=idx].to_string());
                    }
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_from_fenced_block() {
        let text = "here you go:\n```json\n{\"objective\": \"do it\"}\n```\nthanks";
        assert_eq!(extract_json(text).unwrap(), "{\"objective\": \"do it\"}");
    }

    #[test]
    fn extracts_first_balanced_braces_without_fence() {
        let text = "preamble {\"a\": {\"b\": 1}} trailing junk }";
        assert_eq!(extract_json(text).unwrap(), "{\"a\": {\"b\": 1}}");
    }

    #[test]
    fn returns_none_when_no_json_present() {
        assert!(extract_json("no braces here at all").is_none());
    }

    struct StubReasoner {
        response: String,
    }

    #[async_trait]
    impl LlmReasoner for StubReasoner {
        async fn generate(&self, _prompt: &str, _temperature: f32, _max_tokens: u32) -> anyhow::Result<String> {
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn reason_parses_a_well_formed_response() {
        let reasoner = StubReasoner {
            response: "```json\n{\"objective\": \"ship it\", \"tasks\": []}\n```".to_string(),
        };
        let plan = reason(&reasoner, "prompt").await.unwrap();
        assert_eq!(plan.objective, "ship it");
    }

    #[tokio::test]
    async fn reason_rejects_malformed_json() {
        let reasoner = StubReasoner { response: "not json at all".to_string() };
        assert!(reason(&reasoner, "prompt").await.is_err());
    }
}
