pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Types(#[from] pera_types::error::Error),

    #[error(transparent)]
    Memory(#[from] pera_memory::Error),

    #[error(transparent)]
    Planner(#[from] pera_planner::Error),

    #[error("illegal session state transition from {0:?} to {1:?}")]
    IllegalTransition(crate::state::SessionState, crate::state::SessionState),

    #[error("session canceled")]
    Canceled,

    #[error("global admission semaphore closed")]
    AdmissionClosed,

    #[error("plan serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
