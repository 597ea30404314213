#![allow(clippy::missing_errors_doc)]

//! # PERA Planner
//!
//! The Planner (`spec.md` §4.4): turns an accepted goal into a validated,
//! optimized [`Plan`](pera_types::plan::Plan) by preferring adaptation of a
//! previously-learned skill over LLM reasoning, falling back to a hybrid of
//! both when neither alone is confident enough.

pub mod adapt;
pub mod cache;
pub mod error;
pub mod intent;
pub mod llm;
pub mod planner;
pub mod strategy;
pub mod validate;

pub use adapt::{adapt_skill, rank_candidates};
pub use cache::PlanCache;
pub use error::{Error, Result};
pub use intent::{classify_intent, is_complex, preprocess, Intent};
pub use llm::{build_prompt, extract_json, reason, LlmReasoner, ReasonedPlan, ReasonedTask};
pub use planner::Planner;
pub use strategy::{select_strategy, Strategy};
pub use validate::validate_plan;
