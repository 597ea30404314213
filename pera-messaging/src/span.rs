use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::event::CorrelationId;

/// One module-boundary span within a trace (`spec.md` §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub module: String,
    pub action: String,
    pub start: DateTime<Utc>,
    pub duration: Duration,
    pub success: bool,
    pub error: Option<String>,
}

impl Span {
    #[must_use]
    pub fn new(module: impl Into<String>, action: impl Into<String>, start: DateTime<Utc>) -> Self {
        Self {
            module: module.into(),
            action: action.into(),
            start,
            duration: Duration::ZERO,
            success: true,
            error: None,
        }
    }

    /// Close the span: record its duration and outcome.
    #[must_use]
    pub fn finish(mut self, end: DateTime<Utc>, success: bool, error: Option<String>) -> Self {
        self.duration = (end - self.start).to_std().unwrap_or_default();
        self.success = success;
        self.error = error;
        self
    }
}

/// The set of spans recorded for one correlation ID, finalized once the
/// root span (the first span opened for that ID) closes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanTree {
    pub spans: Vec<Span>,
    pub finalized: bool,
}

impl SpanTree {
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.spans.iter().map(|s| s.duration).sum()
    }

    #[must_use]
    pub fn has_failure(&self) -> bool {
        self.spans.iter().any(|s| !s.success)
    }
}

/// Accumulates span trees across every in-flight correlation ID, in a
/// plain `Mutex<HashMap<..>>` (the teacher avoids `dashmap`; this
/// workspace follows suit to keep the dependency stack aligned).
pub struct TraceRegistry {
    trees: Mutex<HashMap<CorrelationId, SpanTree>>,
}

impl TraceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { trees: Mutex::new(HashMap::new()) }
    }

    /// Record a finished span under its correlation ID, marking the tree
    /// finalized the first time `is_root` is set for a closing span.
    pub fn record(&self, correlation_id: CorrelationId, span: Span, is_root: bool) {
        let mut trees = self.trees.lock();
        let tree = trees.entry(correlation_id).or_default();
        tree.spans.push(span);
        if is_root {
            tree.finalized = true;
        }
    }

    #[must_use]
    pub fn get(&self, correlation_id: CorrelationId) -> Option<SpanTree> {
        self.trees.lock().get(&correlation_id).cloned()
    }

    /// Remove and return finalized trees, freeing memory for completed
    /// traces (`memory-core/src/telemetry`'s accumulate-then-drain pattern,
    /// generalized from counters to span trees).
    pub fn drain_finalized(&self) -> Vec<(CorrelationId, SpanTree)> {
        let mut trees = self.trees.lock();
        let finalized: Vec<CorrelationId> =
            trees.iter().filter(|(_, tree)| tree.finalized).map(|(id, _)| *id).collect();
        finalized.into_iter().filter_map(|id| trees.remove(&id).map(|tree| (id, tree))).collect()
    }
}

impl Default for TraceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedTraceRegistry = Arc<TraceRegistry>;
