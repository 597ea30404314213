#![allow(clippy::missing_errors_doc)]

//! # PERA Execution Engine
//!
//! The Execution Engine (`spec.md` §4.3): validates tasks, resolves a tool
//! through [`pera_registry::ToolRegistry`], dispatches under a timeout,
//! classifies failures against a fixed pattern table, and retries with
//! backoff and jitter until the retry budget is spent or the caller
//! cancels the run.

pub mod classify;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod retry;
pub mod validate;

pub use classify::{classify_error, invalid_task_classification};
pub use engine::{ExecutionContext, ExecutionEngine};
pub use error::{Error, Result};
pub use metadata::{ExecutionMetadata, ExecutionState};
pub use retry::{compute_delay, fibonacci};
pub use validate::validate_task;
