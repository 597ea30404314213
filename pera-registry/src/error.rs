pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the tool registry.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("tool {0} is not registered")]
    ToolNotFound(String),

    #[error("no tool is registered for task-type {0}")]
    NoToolForTaskType(String),

    #[error("tool {0} rejected parameters: {1}")]
    InvalidParameters(String, String),
}
