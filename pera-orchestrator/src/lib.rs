#![allow(clippy::missing_errors_doc)]

//! # PERA Orchestrator
//!
//! The Orchestrator (`spec.md` §4.5): drives one goal end-to-end through an
//! explicit [`state::SessionState`] machine — `init → planning → executing
//! → recording → learning-scheduled → done | error` — wiring together the
//! Planner, Execution Engine, Working/Episodic stores, and the messaging
//! bus's events and trace spans.

pub mod error;
pub mod orchestrator;
pub mod state;

pub use error::{Error, Result};
pub use orchestrator::{GoalOutcome, LearningScheduler, NoopLearningScheduler, Orchestrator};
pub use state::SessionState;
