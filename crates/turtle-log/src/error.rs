use std::io;

/// Errors produced by event log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("event log lock poisoned")]
    LockPoisoned,

    #[error("append rejected: {0}")]
    AppendRejected(String),

    #[error("transaction actor is '{expected}', append used '{actual}'")]
    ActorMismatch { expected: String, actual: String },

    #[error("corrupt log at sequence {sequence}: {reason}")]
    Corrupt { sequence: u64, reason: String },
}

/// Convenience alias used throughout the log crate.
pub type LogResult<T> = std::result::Result<T, LogError>;
