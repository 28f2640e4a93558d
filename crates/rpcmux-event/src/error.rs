/// Errors that can occur while encoding or decoding events.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// The event body is not the expected `[header, name, args]` JSON
    /// triple.
    #[error("malformed event body: {0}")]
    Body(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EventError>;
