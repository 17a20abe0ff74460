use serde::{Deserialize, Serialize};

use speakin_types::{AccountId, BookingId, Credits, EscrowRecord, SessionType};

/// Current protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Balance ledger
// ---------------------------------------------------------------------------

/// How an adjustment is applied to the stored balance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustMode {
    /// Overwrite the balance with `amount`.
    AbsoluteSet,
    /// Add `amount` to the balance.
    CreditAdd,
    /// Subtract `amount` if and only if the balance covers it.
    Deduct,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustBalanceRequest {
    pub account_id: AccountId,
    pub amount: Credits,
    pub mode: AdjustMode,
    /// Requests sharing a key are applied at most once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl AdjustBalanceRequest {
    pub fn new(account_id: AccountId, amount: Credits, mode: AdjustMode) -> Self {
        Self { account_id, amount, mode, idempotency_key: None }
    }

    pub fn absolute_set(account_id: AccountId, amount: Credits) -> Self {
        Self::new(account_id, amount, AdjustMode::AbsoluteSet)
    }

    pub fn credit_add(account_id: AccountId, amount: Credits) -> Self {
        Self::new(account_id, amount, AdjustMode::CreditAdd)
    }

    pub fn deduct(account_id: AccountId, amount: Credits) -> Self {
        Self::new(account_id, amount, AdjustMode::Deduct)
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustBalanceResponse {
    pub success: bool,
    pub account_id: AccountId,
    pub balance_credits: Credits,
    /// True when an earlier request with the same idempotency key was replayed.
    #[serde(default)]
    pub replayed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub account_id: AccountId,
    pub balance_credits: Credits,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAccountRequest {
    pub account_id: AccountId,
    #[serde(default)]
    pub balance_credits: Credits,
}

// ---------------------------------------------------------------------------
// Escrow store
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockCreditsRequest {
    pub student_id: AccountId,
    pub tutor_id: AccountId,
    pub booking_id: BookingId,
    pub credits_required: Credits,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundLockedCreditsRequest {
    pub booking_id: BookingId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseLockedCreditsRequest {
    pub session_type: SessionType,
    pub booking_id: BookingId,
}

/// Result of lock, refund, and release calls.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowResponse {
    pub success: bool,
    pub record: EscrowRecord,
    /// Credits paid to the tutor; only set on release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payout: Option<Credits>,
}

impl EscrowResponse {
    pub fn ok(record: EscrowRecord) -> Self {
        Self { success: true, record, payout: None }
    }

    pub fn released(record: EscrowRecord, payout: Credits) -> Self {
        Self { success: true, record, payout: Some(payout) }
    }
}

// ---------------------------------------------------------------------------
// Errors on the wire
// ---------------------------------------------------------------------------

/// Machine-readable error category carried in [`ErrorBody`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    InsufficientCredits,
    Unavailable,
    Internal,
}

impl ErrorCode {
    pub fn http_status(self) -> u16 {
        match self {
            Self::InvalidRequest => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::InsufficientCredits => 422,
            Self::Unavailable => 503,
            Self::Internal => 500,
        }
    }

    /// Best guess for a status when the peer sent no parseable body.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 => Self::InvalidRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            409 => Self::Conflict,
            422 => Self::InsufficientCredits,
            503 => Self::Unavailable,
            s if (400..500).contains(&s) => Self::InvalidRequest,
            _ => Self::Internal,
        }
    }
}

/// JSON error body returned by every service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}
