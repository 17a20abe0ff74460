use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("unknown session type: {0}")]
    UnknownSessionType(String),

    #[error("unknown status: {0}")]
    UnknownStatus(String),

    #[error("invalid payout share {numerator}/{denominator}")]
    InvalidShare { numerator: u64, denominator: u64 },
}
