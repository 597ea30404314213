#![allow(clippy::missing_errors_doc)]

//! # PERA Memory
//!
//! The memory substrate (`spec.md` §4.1): three narrow traits —
//! [`working::WorkingStore`], [`knowledge::KnowledgeStore`],
//! [`episodic::EpisodicLog`] — plus in-process default implementations of
//! each. Durable backends (`pera-storage-sqlite`, `pera-storage-embedded`)
//! implement the same traits; callers depend on the trait objects, never on
//! a concrete database, per the capability-interface design note in
//! `spec.md` §9.

pub mod cache;
pub mod circuit_breaker;
pub mod embedding;
pub mod episodic;
pub mod error;
pub mod knowledge;
pub mod working;

pub use cache::ReadThroughCache;
pub use circuit_breaker::CircuitBreaker;
pub use embedding::{cosine_similarity, EmbeddingProvider, HashingEmbeddingProvider};
pub use episodic::{EpisodicLog, InMemoryEpisodicLog};
pub use error::{Error, Result};
pub use knowledge::{InMemoryKnowledgeStore, KnowledgeStore, SkillMatch, SkillPatch};
pub use working::{InMemoryWorkingStore, WorkingStore, WorkingStoreStats};
