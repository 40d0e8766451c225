use turtle_log::LogError;

/// Hard failures that abort a whole engine call.
///
/// Per-item problems (a missing reorder target, a duplicate create id) are
/// not errors at this level; they travel as
/// [`ValidationError`](turtle_types::ValidationError) values in the response.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The event log failed or rejected an append. Nothing was committed.
    #[error("event log error: {0}")]
    Log(#[from] LogError),

    /// The caller cancelled before the batch committed.
    #[error("operation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience alias used throughout the engine crate.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
