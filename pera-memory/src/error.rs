use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the memory substrate's three stores and the circuit
/// breaker that wraps durable backends.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("working store is at capacity")]
    StoreFull,

    #[error("skill {0} not found")]
    SkillNotFound(Uuid),

    #[error("episode {0} not found")]
    EpisodeNotFound(Uuid),

    #[error("skill rejected: {0}")]
    InvalidSkill(String),

    #[error("circuit breaker open, failing fast")]
    CircuitBreakerOpen,

    #[error("underlying backend error: {0}")]
    Backend(anyhow::Error),

    #[error(transparent)]
    Types(#[from] pera_types::Error),
}

impl Error {
    /// Whether a caller can usefully retry this error, mirroring
    /// `pera_types::task::ErrorClassification`'s recoverability notion.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::CircuitBreakerOpen | Self::StoreFull | Self::Backend(_))
    }
}
