pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the execution engine itself (as opposed to a task's
/// tool, whose failures are captured inside `TaskResult` rather than
/// raised — `spec.md` §4.3's "never raises beyond the engine" contract).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] pera_registry::Error),

    #[error(transparent)]
    Memory(#[from] pera_memory::Error),
}
