#![allow(clippy::missing_errors_doc)]

//! # PERA Durable Knowledge Store (redb)
//!
//! Implements [`pera_memory::KnowledgeStore`] over an embedded redb
//! database, for deployments that need Skills and Preferences to survive a
//! restart. In-memory deployments should keep using
//! `pera_memory::InMemoryKnowledgeStore`; this crate is the durable
//! alternative, selected by configuration.

pub mod storage;
mod tables;

pub use storage::RedbKnowledgeStore;
