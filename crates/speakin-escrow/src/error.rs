use speakin_protocol::{ErrorCode, RpcError};
use speakin_types::{BookingId, EscrowStatus};

/// Errors from escrow operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EscrowError {
    /// No escrow record exists for the booking.
    #[error("no escrow record for booking {0}")]
    NotFound(BookingId),

    /// A record exists but is not in the expected state.
    #[error("escrow for booking {booking} is {actual}, expected {expected}")]
    StatusMismatch {
        booking: BookingId,
        expected: EscrowStatus,
        actual: EscrowStatus,
    },

    /// No record in `locked` exists for the booking.
    #[error("no locked escrow for booking {0}")]
    NotLocked(BookingId),

    /// A lock request disagrees with the record already held.
    #[error("escrow conflict for booking {booking}: {reason}")]
    Conflict { booking: BookingId, reason: String },

    #[error("invalid escrow request: {0}")]
    InvalidRequest(String),

    /// The tutor payout could not be credited; a repeated release retries it.
    #[error("payout for booking {booking} failed: {source}")]
    Payout {
        booking: BookingId,
        #[source]
        source: RpcError,
    },

    /// The buyer could not be credited for a purchase.
    #[error("purchase {reference} could not be credited: {source}")]
    PurchaseCredit {
        reference: String,
        #[source]
        source: RpcError,
    },

    #[error("purchase {0} not found")]
    PurchaseNotFound(String),
}

/// Result alias for escrow operations.
pub type EscrowResult<T> = Result<T, EscrowError>;

impl From<EscrowError> for RpcError {
    fn from(err: EscrowError) -> Self {
        match &err {
            EscrowError::NotFound(_) | EscrowError::NotLocked(_) | EscrowError::PurchaseNotFound(_) => {
                RpcError::NotFound(err.to_string())
            }
            EscrowError::StatusMismatch { .. } | EscrowError::Conflict { .. } => {
                RpcError::rejected(ErrorCode::Conflict, err.to_string())
            }
            EscrowError::InvalidRequest(_) => RpcError::rejected(ErrorCode::InvalidRequest, err.to_string()),
            EscrowError::Payout { .. } | EscrowError::PurchaseCredit { .. } => {
                RpcError::remote(ErrorCode::Unavailable, err.to_string())
            }
        }
    }
}
