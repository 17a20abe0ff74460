use std::time::Duration;

use thiserror::Error;

use crate::message::{ErrorBody, ErrorCode};

/// Failure of a cross-service call.
///
/// `NotFound` is kept apart from other rejections: callers treat it as an
/// answer ("nothing to refund") rather than as a fault.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RpcError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("rejected ({code:?}): {message}")]
    Rejected { code: ErrorCode, message: String },

    #[error("remote failure ({code:?}): {message}")]
    Remote { code: ErrorCode, message: String },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl RpcError {
    pub fn rejected(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Rejected { code, message: message.into() }
    }

    pub fn remote(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Remote { code, message: message.into() }
    }

    /// Rebuild the error a peer reported with the given HTTP status.
    pub fn from_body(status: u16, body: ErrorBody) -> Self {
        match body.code {
            ErrorCode::NotFound => Self::NotFound(body.message),
            code if status < 500 => Self::Rejected { code, message: body.message },
            code => Self::Remote { code, message: body.message },
        }
    }

    /// A failure whose body was not an [`ErrorBody`], e.g. from a proxy in
    /// front of the peer. The peer's own verdict is unknown, so even a 404
    /// is not taken as "not found".
    pub fn undecoded(status: u16, text: impl Into<String>) -> Self {
        let text = text.into();
        let message = if text.trim().is_empty() { format!("http status {status}") } else { text };
        Self::Remote { code: ErrorCode::from_http_status(status), message }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_insufficient_credits(&self) -> bool {
        matches!(self, Self::Rejected { code: ErrorCode::InsufficientCredits, .. })
    }

    /// The wire form of this error, for services relaying it.
    pub fn to_body(&self) -> ErrorBody {
        let code = match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Rejected { code, .. } | Self::Remote { code, .. } => *code,
            Self::Timeout { .. } | Self::Transport(_) => ErrorCode::Unavailable,
            Self::Decode(_) => ErrorCode::Internal,
        };
        ErrorBody::new(code, self.to_string())
    }
}

pub type RpcResult<T> = Result<T, RpcError>;
