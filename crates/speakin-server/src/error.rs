use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use speakin_booking::BookingError;
use speakin_escrow::EscrowError;
use speakin_ledger::LedgerError;
use speakin_protocol::{ErrorBody, ErrorCode, RpcError};
use speakin_saga::SagaError;

/// Errors surfaced by the HTTP services.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("missing or invalid credentials")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Escrow(#[from] EscrowError),

    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("saga log: {0}")]
    Saga(#[from] SagaError),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unauthorized => ErrorCode::Unauthorized,
            Self::Forbidden(_) => ErrorCode::Forbidden,
            Self::BadRequest(_) => ErrorCode::InvalidRequest,
            Self::Ledger(e) => RpcError::from(e.clone()).to_body().code,
            Self::Escrow(e) => escrow_code(e),
            Self::Booking(e) => e.code(),
            Self::Rpc(e) => e.to_body().code,
            Self::Saga(_) | Self::Config(_) | Self::Io(_) | Self::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code().http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

fn escrow_code(err: &EscrowError) -> ErrorCode {
    match err {
        EscrowError::NotFound(_) | EscrowError::NotLocked(_) | EscrowError::PurchaseNotFound(_) => {
            ErrorCode::NotFound
        }
        EscrowError::StatusMismatch { .. } | EscrowError::Conflict { .. } => ErrorCode::Conflict,
        EscrowError::InvalidRequest(_) => ErrorCode::InvalidRequest,
        EscrowError::Payout { .. } | EscrowError::PurchaseCredit { .. } => ErrorCode::Unavailable,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        }
        (status, Json(ErrorBody::new(self.code(), self.to_string()))).into_response()
    }
}
