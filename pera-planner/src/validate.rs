use std::collections::HashSet;

use pera_types::plan::Plan;
use pera_types::task::{TaskType, ToolSelector};

use crate::error::{Error, Result};

fn required_parameter(task_type: &TaskType) -> Option<&'static str> {
    match task_type {
        TaskType::Search => Some("query"),
        TaskType::Generate => Some("prompt"),
        TaskType::Analyze => Some("target"),
        TaskType::Call => Some("endpoint"),
        TaskType::Summarize => Some("content"),
        TaskType::Custom(_) => None,
    }
}

/// Validate a plan's structural and task-specific preconditions
/// (`spec.md` §4.4 "Validation"): delegates DAG validity to
/// [`Plan::validate_dag`], then additionally checks that every named tool
/// is known to the registry and that each task carries its type's required
/// parameter.
pub fn validate_plan(plan: &Plan, known_tools: &HashSet<String>) -> Result<Vec<usize>> {
    let order = plan.validate_dag()?;

    for task in &plan.tasks {
        if let ToolSelector::Named(name) = &task.tool {
            if !known_tools.contains(name) {
                return Err(Error::Types(pera_types::error::Error::Validation(format!(
                    "task {} references unknown tool {name}",
                    task.id
                ))));
            }
        }
        if let Some(param) = required_parameter(&task.task_type) {
            if task.param_str(param).map(str::trim).unwrap_or("").is_empty() {
                return Err(Error::Types(pera_types::error::Error::Validation(format!(
                    "task {} of type {} requires parameter '{param}'",
                    task.id, task.task_type
                ))));
            }
        }
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pera_types::plan::PlanMetadata;
    use pera_types::task::Task;
    use serde_json::json;

    #[test]
    fn rejects_unknown_tool_reference() {
        let plan = Plan::new(
            "goal",
            vec![Task::new("t1", "search", TaskType::Search)
                .with_param("query", json!("x"))
                .with_tool("ghost_tool")],
            PlanMetadata::generated(0.9),
        );
        let known = HashSet::new();
        assert!(validate_plan(&plan, &known).is_err());
    }

    #[test]
    fn rejects_missing_required_parameter() {
        let plan = Plan::new(
            "goal",
            vec![Task::new("t1", "search", TaskType::Search)],
            PlanMetadata::generated(0.9),
        );
        let known = HashSet::new();
        assert!(validate_plan(&plan, &known).is_err());
    }

    #[test]
    fn accepts_a_well_formed_plan() {
        let plan = Plan::new(
            "goal",
            vec![Task::new("t1", "search", TaskType::Search)
                .with_param("query", json!("x"))
                .with_tool("web_search")],
            PlanMetadata::generated(0.9),
        );
        let mut known = HashSet::new();
        known.insert("web_search".to_string());
        assert!(validate_plan(&plan, &known).is_ok());
    }
}
