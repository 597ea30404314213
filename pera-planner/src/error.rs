pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the planner.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Types(#[from] pera_types::error::Error),

    #[error(transparent)]
    Memory(#[from] pera_memory::Error),

    #[error("LLM reasoning failed: {0}")]
    Llm(String),

    #[error("plan failed validation after {0} replan attempt(s): {1}")]
    PlanningFailed(u32, String),
}
