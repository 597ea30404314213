use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A user-stated goal accepted into the system.
///
/// Immutable once accepted: callers construct a new `Goal` rather than
/// mutating an existing one, matching the "immutable once accepted"
/// invariant in the data model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    /// Session this goal belongs to.
    pub session_id: Uuid,
    /// Free-text goal statement.
    pub text: String,
    /// Arbitrary caller-supplied context.
    pub context: HashMap<String, Value>,
    /// When the goal was accepted.
    pub accepted_at: DateTime<Utc>,
    /// Priority in `[1, 10]`, matching `GoalRequest.priority` on the wire.
    pub priority: u8,
}

impl Goal {
    /// Construct a new goal for a (possibly fresh) session.
    #[must_use]
    pub fn new(session_id: Uuid, text: impl Into<String>, context: HashMap<String, Value>) -> Self {
        Self {
            session_id,
            text: text.into(),
            context,
            accepted_at: Utc::now(),
            priority: 5,
        }
    }

    /// Builder-style priority override, clamped to the `[1, 10]` wire range.
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 10);
        self
    }

    /// Normalized form used for classification and cache keys: trimmed,
    /// whitespace-collapsed, lowercased.
    #[must_use]
    pub fn normalized_text(&self) -> String {
        self.text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
    }
}
