use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::task::ErrorClassification;

/// How a single task execution concluded, distinct from `TaskResult::success`
/// in that it also distinguishes a timeout or cancellation from a plain
/// tool failure (`spec.md` §4.3's metadata record).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Success,
    Failure,
    Timeout,
    Canceled,
    Partial,
}

/// Execution record attached to every task run, independent of the
/// `TaskResult` the orchestrator consumes: carries identification, timing,
/// the tool actually used, and rough performance/efficiency estimates.
///
/// The efficiency fields are explicitly non-normative (`SPEC_FULL.md` §9
/// Open Question): no process-level CPU/memory sampler is wired in, so
/// they default to `None` until a deployment supplies one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub task_id: String,
    pub execution_id: Uuid,
    pub session_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration: Duration,
    pub state: ExecutionState,
    pub tool_used: Option<String>,
    pub parameters_snapshot: HashMap<String, Value>,
    pub error_classification: Option<ErrorClassification>,
    pub retries: u32,
    pub relative_duration: f64,
    pub throughput: f64,
    pub stability: f64,
    pub cpu_estimate: Option<f64>,
    pub memory_estimate_bytes: Option<u64>,
    pub integrity_hash: String,
}

impl ExecutionMetadata {
    /// Canonical bytes hashed into `integrity_hash`, following
    /// [`crate::episode::Episode::canonical_bytes`]'s pattern of hashing
    /// only the fields that define the record's identity.
    fn canonical_bytes(
        task_id: &str,
        execution_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        state: ExecutionState,
    ) -> Vec<u8> {
        format!("{task_id}|{execution_id}|{}|{}|{state:?}", start.to_rfc3339(), end.to_rfc3339())
            .into_bytes()
    }

    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        task_id: impl Into<String>,
        session_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        state: ExecutionState,
        tool_used: Option<String>,
        parameters_snapshot: HashMap<String, Value>,
        error_classification: Option<ErrorClassification>,
        retries: u32,
        estimated_duration: Option<Duration>,
    ) -> Self {
        let task_id = task_id.into();
        let execution_id = Uuid::new_v4();
        let duration = (end - start).to_std().unwrap_or_default();

        let relative_duration = estimated_duration
            .filter(|d| !d.is_zero())
            .map_or(1.0, |estimated| duration.as_secs_f64() / estimated.as_secs_f64());
        let throughput = if duration.as_secs_f64() > 0.0 { 1.0 / duration.as_secs_f64() } else { 0.0 };
        let stability = 1.0 / (1.0 + f64::from(retries));

        let mut hasher = Sha256::new();
        hasher.update(Self::canonical_bytes(&task_id, execution_id, start, end, state));
        let integrity_hash = format!("{:x}", hasher.finalize());

        Self {
            task_id,
            execution_id,
            session_id,
            start,
            end,
            duration,
            state,
            tool_used,
            parameters_snapshot,
            error_classification,
            retries,
            relative_duration,
            throughput,
            stability,
            cpu_estimate: None,
            memory_estimate_bytes: None,
            integrity_hash,
        }
    }

    /// Recompute the hash and compare, detecting tampering or corruption
    /// in stored metadata.
    #[must_use]
    pub fn verify_integrity(&self) -> bool {
        let mut hasher = Sha256::new();
        hasher.update(Self::canonical_bytes(
            &self.task_id,
            self.execution_id,
            self.start,
            self.end,
            self.state,
        ));
        format!("{:x}", hasher.finalize()) == self.integrity_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(start: DateTime<Utc>, end: DateTime<Utc>) -> ExecutionMetadata {
        ExecutionMetadata::new(
            "t1",
            Uuid::new_v4(),
            start,
            end,
            ExecutionState::Success,
            Some("echo".to_string()),
            HashMap::new(),
            None,
            0,
            Some(Duration::from_secs(1)),
        )
    }

    #[test]
    fn integrity_hash_verifies() {
        let start = Utc::now();
        let end = start + chrono::Duration::milliseconds(500);
        let meta = sample(start, end);
        assert!(meta.verify_integrity());
    }

    #[test]
    fn tampering_breaks_verification() {
        let start = Utc::now();
        let end = start + chrono::Duration::milliseconds(500);
        let mut meta = sample(start, end);
        meta.task_id = "tampered".to_string();
        assert!(!meta.verify_integrity());
    }

    #[test]
    fn relative_duration_compares_against_estimate() {
        let start = Utc::now();
        let end = start + chrono::Duration::seconds(2);
        let meta = sample(start, end);
        assert!((meta.relative_duration - 2.0).abs() < 1e-6);
    }

    #[test]
    fn relative_duration_defaults_to_one_without_estimate() {
        let start = Utc::now();
        let end = start + chrono::Duration::seconds(2);
        let meta = ExecutionMetadata::new(
            "t1",
            Uuid::new_v4(),
            start,
            end,
            ExecutionState::Success,
            None,
            HashMap::new(),
            None,
            0,
            None,
        );
        assert!((meta.relative_duration - 1.0).abs() < 1e-6);
    }

    #[test]
    fn stability_decreases_with_retries() {
        let start = Utc::now();
        let end = start + chrono::Duration::milliseconds(100);
        let fresh = sample(start, end);
        let retried = ExecutionMetadata::new(
            "t1",
            Uuid::new_v4(),
            start,
            end,
            ExecutionState::Success,
            None,
            HashMap::new(),
            None,
            3,
            None,
        );
        assert!(retried.stability < fresh.stability);
    }
}
