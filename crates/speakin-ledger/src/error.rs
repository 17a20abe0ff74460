use speakin_protocol::{ErrorCode, RpcError};
use speakin_types::{AccountId, Credits};

/// Errors produced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    #[error("account {0} already exists")]
    AccountExists(AccountId),

    #[error("insufficient credits on account {account}: balance {balance}, requested {requested}")]
    InsufficientCredits {
        account: AccountId,
        balance: Credits,
        requested: Credits,
    },

    #[error("balance overflow on account {0}")]
    Overflow(AccountId),

    #[error("idempotency key {0:?} was already used for a different adjustment")]
    IdempotencyConflict(String),

    #[error("ledger lock poisoned")]
    LockPoisoned,
}

impl From<LedgerError> for RpcError {
    fn from(err: LedgerError) -> Self {
        match &err {
            LedgerError::AccountNotFound(_) => RpcError::NotFound(err.to_string()),
            LedgerError::AccountExists(_) | LedgerError::IdempotencyConflict(_) => {
                RpcError::rejected(ErrorCode::Conflict, err.to_string())
            }
            LedgerError::InsufficientCredits { .. } => {
                RpcError::rejected(ErrorCode::InsufficientCredits, err.to_string())
            }
            LedgerError::Overflow(_) => RpcError::rejected(ErrorCode::InvalidRequest, err.to_string()),
            LedgerError::LockPoisoned => RpcError::remote(ErrorCode::Internal, err.to_string()),
        }
    }
}
