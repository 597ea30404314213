#![allow(clippy::missing_errors_doc)]

//! # PERA Registry
//!
//! The Tool Registry (`spec.md` §4.2): discovers, groups by category, and
//! ranks [`tool::Tool`] implementations for a task-type, plus a
//! [`tool::execute_safely`] wrapper that meters every call.

pub mod error;
pub mod metrics;
pub mod registry;
pub mod tool;

pub use error::{Error, Result};
pub use metrics::{ToolMetrics, ToolMetricsSnapshot};
pub use registry::{RankedTool, TaskTypeCategoryMap, ToolRegistry};
pub use tool::{execute_safely, ParamSchema, ParamType, SafeExecutionResult, Tool, ToolDependencies};
