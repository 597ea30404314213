#![allow(clippy::missing_errors_doc)]

//! # PERA Durable Episodic Log (libSQL/Turso)
//!
//! Implements [`pera_memory::EpisodicLog`] over a libSQL database, for
//! deployments that need the episodic log to survive a restart. In-memory
//! deployments should keep using `pera_memory::InMemoryEpisodicLog`; this
//! crate is the durable alternative, selected by configuration.

pub mod schema;
pub mod storage;

pub use storage::SqliteEpisodicLog;
