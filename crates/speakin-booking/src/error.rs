use speakin_protocol::{ErrorCode, RpcError};
use speakin_saga::SagaError;
use speakin_types::{BookingStatus, Credits};

/// Errors from booking operations.
///
/// Client errors (4xx) are raised before any remote side effect. Remote and
/// compensation failures are server errors.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("invalid request: {0}")]
    Validation(String),

    /// A booking or slot rule refused the request.
    #[error("{rule}: {reason}")]
    Rejected { rule: String, reason: String },

    #[error("insufficient credits: {available} available, {required} required")]
    InsufficientCredits { required: Credits, available: Credits },

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("cannot move booking from {from} to {to}")]
    InvalidTransition { from: BookingStatus, to: BookingStatus },

    /// A ledger or escrow call failed; no local state was changed.
    #[error("{operation} failed: {source}")]
    Remote {
        operation: &'static str,
        #[source]
        source: RpcError,
    },

    /// Undoing a partial booking failed; recovery will retry it.
    #[error("compensation {operation} failed after {cause}: {source}")]
    CompensationFailed {
        operation: &'static str,
        cause: String,
        #[source]
        source: RpcError,
    },

    #[error("saga log error: {0}")]
    Saga(#[from] SagaError),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type BookingResult<T> = Result<T, BookingError>;

impl BookingError {
    pub fn remote(operation: &'static str, source: RpcError) -> Self {
        Self::Remote { operation, source }
    }

    /// Error category on the wire.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) | Self::Rejected { .. } => ErrorCode::InvalidRequest,
            Self::InsufficientCredits { .. } => ErrorCode::InsufficientCredits,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Conflict(_) | Self::InvalidTransition { .. } => ErrorCode::Conflict,
            Self::Forbidden(_) => ErrorCode::Forbidden,
            Self::Remote { .. } => ErrorCode::Unavailable,
            Self::CompensationFailed { .. } | Self::Saga(_) | Self::Storage(_) => ErrorCode::Internal,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.code().http_status() < 500
    }
}
