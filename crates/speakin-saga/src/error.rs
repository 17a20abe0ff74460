use std::io;

/// Errors produced by the saga log.
#[derive(Debug, thiserror::Error)]
pub enum SagaError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("saga log lock poisoned")]
    LockPoisoned,
}

/// Convenience alias used throughout the saga crate.
pub type SagaResult<T> = Result<T, SagaError>;
