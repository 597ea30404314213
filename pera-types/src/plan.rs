use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::task::Task;

/// How a [`Plan`] came to exist, recorded in its metadata per the data
/// model's `origin ∈ {generated, adapted, hybrid}` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanOrigin {
    Generated,
    Adapted,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanMetadata {
    pub origin: PlanOrigin,
    pub source_skill_id: Option<uuid::Uuid>,
    pub created_at: DateTime<Utc>,
    pub model_used: Option<String>,
    pub confidence: f32,
}

impl PlanMetadata {
    #[must_use]
    pub fn generated(confidence: f32) -> Self {
        Self {
            origin: PlanOrigin::Generated,
            source_skill_id: None,
            created_at: Utc::now(),
            model_used: None,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    #[must_use]
    pub fn adapted(source_skill_id: uuid::Uuid, confidence: f32) -> Self {
        Self {
            origin: PlanOrigin::Adapted,
            source_skill_id: Some(source_skill_id),
            created_at: Utc::now(),
            model_used: None,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    #[must_use]
    pub fn hybrid(source_skill_id: Option<uuid::Uuid>, confidence: f32) -> Self {
        Self {
            origin: PlanOrigin::Hybrid,
            source_skill_id,
            created_at: Utc::now(),
            model_used: None,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// A structured plan turning a goal into an ordered set of tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub objective: String,
    pub tasks: Vec<Task>,
    pub resource_requirements: HashMap<String, Value>,
    pub constraints: Vec<String>,
    pub metadata: PlanMetadata,
}

impl Plan {
    #[must_use]
    pub fn new(objective: impl Into<String>, tasks: Vec<Task>, metadata: PlanMetadata) -> Self {
        Self {
            objective: objective.into(),
            tasks,
            resource_requirements: HashMap::new(),
            constraints: Vec::new(),
            metadata,
        }
    }

    /// Validate the plan's structural invariants: at least one task, every
    /// dependency resolves within the plan, and the dependency graph is
    /// acyclic. Returns the topological order (as task indices) on success.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty plan,
    /// [`Error::UnknownDependency`] for a dangling dependency, or
    /// [`Error::CyclicDependency`] if the graph has a cycle.
    pub fn validate_dag(&self) -> Result<Vec<usize>> {
        if self.tasks.is_empty() {
            return Err(Error::Validation("plan has no tasks".to_string()));
        }

        let index_of: HashMap<&str, usize> =
            self.tasks.iter().enumerate().map(|(i, t)| (t.id.as_str(), i)).collect();

        for task in &self.tasks {
            for dep in &task.dependencies {
                if !index_of.contains_key(dep.as_str()) {
                    return Err(Error::UnknownDependency(task.id.clone(), dep.clone()));
                }
            }
        }

        // Kahn's algorithm over task indices.
        let n = self.tasks.len();
        let mut indegree = vec![0usize; n];
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, task) in self.tasks.iter().enumerate() {
            for dep in &task.dependencies {
                let dep_idx = index_of[dep.as_str()];
                successors[dep_idx].push(i);
                indegree[i] += 1;
            }
        }

        let mut queue: VecDeque<usize> =
            (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = queue.pop_front() {
            order.push(i);
            for &succ in &successors[i] {
                indegree[succ] -= 1;
                if indegree[succ] == 0 {
                    queue.push_back(succ);
                }
            }
        }

        if order.len() != n {
            return Err(Error::CyclicDependency);
        }

        Ok(order)
    }

    /// Group the topological order into maximal dependency-independent
    /// bands: all tasks in a band may execute concurrently because none of
    /// them depends on another task in the same or a later band.
    #[must_use]
    pub fn bands(&self, order: &[usize]) -> Vec<Vec<usize>> {
        let mut depth = vec![0usize; self.tasks.len()];
        let index_of: HashMap<&str, usize> =
            self.tasks.iter().enumerate().map(|(i, t)| (t.id.as_str(), i)).collect();

        for &i in order {
            let task = &self.tasks[i];
            let max_dep_depth = task
                .dependencies
                .iter()
                .map(|d| depth[index_of[d.as_str()]])
                .max();
            depth[i] = max_dep_depth.map_or(0, |d| d + 1);
        }

        let max_depth = depth.iter().copied().max().unwrap_or(0);
        let mut bands = vec![Vec::new(); max_depth + 1];
        for &i in order {
            bands[depth[i]].push(i);
        }
        bands
    }

    /// Critical-path duration estimate: the longest chain of
    /// `estimated_duration`s following dependency order, plus 20% slack as
    /// the per-plan timeout budget in §5.
    #[must_use]
    pub fn critical_path_timeout(&self, order: &[usize]) -> std::time::Duration {
        let index_of: HashMap<&str, usize> =
            self.tasks.iter().enumerate().map(|(i, t)| (t.id.as_str(), i)).collect();
        let mut finish = vec![std::time::Duration::ZERO; self.tasks.len()];

        for &i in order {
            let task = &self.tasks[i];
            let start = task
                .dependencies
                .iter()
                .map(|d| finish[index_of[d.as_str()]])
                .max()
                .unwrap_or_default();
            let dur = task.estimated_duration.unwrap_or(std::time::Duration::from_secs(30));
            finish[i] = start + dur;
        }

        let critical = finish.into_iter().max().unwrap_or_default();
        critical.mul_f64(1.2)
    }

    /// Set of unique tool names referenced explicitly (not `"auto"`).
    #[must_use]
    pub fn referenced_tools(&self) -> HashSet<&str> {
        self.tasks
            .iter()
            .filter_map(|t| match &t.tool {
                crate::task::ToolSelector::Named(name) => Some(name.as_str()),
                crate::task::ToolSelector::Auto => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskType;

    fn plan_of(tasks: Vec<Task>) -> Plan {
        Plan::new("test objective", tasks, PlanMetadata::generated(0.9))
    }

    #[test]
    fn empty_plan_is_rejected() {
        let plan = plan_of(vec![]);
        assert!(matches!(plan.validate_dag(), Err(Error::Validation(_))));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let plan = plan_of(vec![
            Task::new("t1", "first", TaskType::Search).with_dependency("ghost"),
        ]);
        assert!(matches!(plan.validate_dag(), Err(Error::UnknownDependency(_, _))));
    }

    #[test]
    fn cycle_is_rejected() {
        let plan = plan_of(vec![
            Task::new("t1", "first", TaskType::Search).with_dependency("t2"),
            Task::new("t2", "second", TaskType::Generate).with_dependency("t1"),
        ]);
        assert!(matches!(plan.validate_dag(), Err(Error::CyclicDependency)));
    }

    #[test]
    fn linear_chain_orders_correctly() {
        let plan = plan_of(vec![
            Task::new("t2", "second", TaskType::Generate).with_dependency("t1"),
            Task::new("t1", "first", TaskType::Search),
        ]);
        let order = plan.validate_dag().unwrap();
        let ids: Vec<&str> = order.iter().map(|&i| plan.tasks[i].id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2"]);
    }

    #[test]
    fn independent_tasks_share_a_band() {
        let plan = plan_of(vec![
            Task::new("t1", "first", TaskType::Search),
            Task::new("t2", "second", TaskType::Search),
            Task::new("t3", "third", TaskType::Generate)
                .with_dependency("t1")
                .with_dependency("t2"),
        ]);
        let order = plan.validate_dag().unwrap();
        let bands = plan.bands(&order);
        assert_eq!(bands.len(), 2);
        assert_eq!(bands[0].len(), 2);
        assert_eq!(bands[1].len(), 1);
    }

    #[test]
    fn validation_is_idempotent() {
        let plan = plan_of(vec![
            Task::new("t1", "first", TaskType::Search),
            Task::new("t2", "second", TaskType::Generate).with_dependency("t1"),
        ]);
        let order1 = plan.validate_dag().unwrap();
        let order2 = plan.validate_dag().unwrap();
        assert_eq!(order1, order2);
    }
}
