use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Correlation ID threaded through every event and span emitted for one
/// goal's PERA cycle, following the teacher's `CorrelationId` newtype
/// (`memory-core/src/tracing/mod.rs`), generalized here from a
/// logging-only helper into the event bus's routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CorrelationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// The fixed set of event topics a PERA deployment's modules publish to
/// (`spec.md` §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PlanGenerated,
    TaskExecuted,
    EpisodeRecorded,
    SkillUpdated,
    SystemError,
    PerformanceAlert,
}

impl EventType {
    #[must_use]
    pub fn topic(self) -> &'static str {
        match self {
            EventType::PlanGenerated => "plan.generated",
            EventType::TaskExecuted => "task.executed",
            EventType::EpisodeRecorded => "episode.recorded",
            EventType::SkillUpdated => "skill.updated",
            EventType::SystemError => "system.error",
            EventType::PerformanceAlert => "performance.alert",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

/// Wire schema for every event published on the bus (`spec.md` §6's
/// `EventEnvelope`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_type: EventType,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub origin_module: String,
    pub correlation_id: CorrelationId,
    pub data: Value,
    pub metadata: serde_json::Map<String, Value>,
}

impl EventEnvelope {
    #[must_use]
    pub fn new(
        event_type: EventType,
        severity: Severity,
        origin_module: impl Into<String>,
        correlation_id: CorrelationId,
        data: Value,
    ) -> Self {
        Self {
            event_type,
            severity,
            timestamp: Utc::now(),
            origin_module: origin_module.into(),
            correlation_id,
            data,
            metadata: serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_names_match_spec_literal_strings() {
        assert_eq!(EventType::PlanGenerated.topic(), "plan.generated");
        assert_eq!(EventType::TaskExecuted.topic(), "task.executed");
        assert_eq!(EventType::EpisodeRecorded.topic(), "episode.recorded");
        assert_eq!(EventType::SkillUpdated.topic(), "skill.updated");
        assert_eq!(EventType::SystemError.topic(), "system.error");
        assert_eq!(EventType::PerformanceAlert.topic(), "performance.alert");
    }

    #[test]
    fn severity_orders_from_debug_to_critical() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Error < Severity::Critical);
    }
}
