pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the event bus.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no subscribers for topic {0}")]
    NoSubscribers(String),

    #[error("correlation id {0} has no open span tree")]
    UnknownCorrelation(uuid::Uuid),
}
