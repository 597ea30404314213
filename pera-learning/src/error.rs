pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the learning loop.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Memory(#[from] pera_memory::Error),

    #[error(transparent)]
    Types(#[from] pera_types::error::Error),

    #[error("analysis {0} failed: {1}")]
    Analysis(&'static str, String),
}
