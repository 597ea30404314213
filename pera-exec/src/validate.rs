use pera_types::task::{Task, TaskType};

/// Required string parameter per task-type, grounded in `spec.md` §4.3
/// step 1's example ("search requires query") and generalized the same
/// way across the other built-in task-types.
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

/// Validate a task's required fields before dispatch.
///
/// Returns `Err(message)` describing the first violation found; the
/// caller turns this into a non-retryable `TaskResult(INVALID_TASK)`.
pub fn validate_task(task: &Task) -> std::result::Result<(), String> {
    if task.id.trim().is_empty() {
        return Err("task id is required".to_string());
    }
    if let Some(param) = required_parameter(&task.task_type) {
        if task.param_str(param).map(str::trim).unwrap_or("").is_empty() {
            return Err(format!("task type {} requires parameter '{param}'", task.task_type));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pera_types::task::ToolSelector;

    #[test]
    fn search_without_query_is_rejected() {
        let task = Task::new("t1", "search", TaskType::Search);
        assert!(validate_task(&task).is_err());
    }

    #[test]
    fn search_with_query_passes() {
        let task =
            Task::new("t1", "search", TaskType::Search).with_param("query", serde_json::json!("rust"));
        assert!(validate_task(&task).is_ok());
    }

    #[test]
    fn custom_task_type_has_no_required_parameter() {
        let task = Task::new("t1", "custom op", TaskType::Custom("export".to_string()));
        assert!(validate_task(&task).is_ok());
        assert_eq!(task.tool, ToolSelector::Auto);
    }
}
