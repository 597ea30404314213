//! Execution-outcome metadata types live in `pera_types::execution` so that
//! `pera_types::episode::Episode` can hold them directly without pera-types
//! depending back on this crate. Re-exported here so existing imports
//! (`crate::metadata::{ExecutionMetadata, ExecutionState}`) keep working.

pub use pera_types::execution::{ExecutionMetadata, ExecutionState};
