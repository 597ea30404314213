use uuid::Uuid;

/// Result type alias used throughout `pera-types`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while constructing or validating the shared data model.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("plan has a dependency cycle")]
    CyclicDependency,

    #[error("task {0} references unknown dependency {1}")]
    UnknownDependency(String, String),

    #[error("skill {0} has no steps")]
    EmptySkill(Uuid),

    #[error("checksum mismatch for episode {0}")]
    ChecksumMismatch(Uuid),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this is a structural validation error (never retried).
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::CyclicDependency | Error::UnknownDependency(_, _)
        )
    }
}
