#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

//! # PERA Types
//!
//! Shared data model for the PERA (Plan–Execute–Record–Adapt) agent
//! orchestrator: [`Goal`], [`Plan`], [`Task`]/[`TaskResult`], [`Skill`],
//! [`Episode`], [`WorkingEntry`], and the [`config::PeraConfig`] that every
//! other crate in the workspace threads through its constructors.
//!
//! This crate has no async runtime dependency and does no I/O: it only
//! defines the wire/storage shape of the system and the structural
//! invariants ([`Plan::validate_dag`], [`Episode::verify_checksum`]) that
//! hold regardless of which storage backend or tool is in play.

pub mod config;
pub mod episode;
pub mod error;
pub mod execution;
pub mod filters;
pub mod goal;
pub mod plan;
pub mod skill;
pub mod task;
pub mod working;

pub use config::PeraConfig;
pub use episode::{Episode, GlobalState};
pub use error::{Error, Result};
pub use execution::{ExecutionMetadata, ExecutionState};
pub use filters::{EpisodeFilter, SkillFilter};
pub use goal::Goal;
pub use plan::{Plan, PlanMetadata, PlanOrigin};
pub use skill::{Preference, Skill, SkillAuthor, SkillStep, SkillType, SkillVersion};
pub use task::{
    ErrorCategory, ErrorClassification, ErrorKind, RecommendedAction, Task, TaskResult,
    TaskType, ToolSelector,
};
pub use working::{StoredValue, WorkingEntry};
