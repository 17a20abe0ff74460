//! Cross-service contracts for Speakin settlement.
//!
//! The booking service talks to the account service (balance ledger) and the
//! payment service (escrow store) through the [`LedgerRpc`] and [`EscrowRpc`]
//! traits. Implementations exist for HTTP (`speakin-client`) and for
//! in-process use (`speakin-ledger`, `speakin-escrow`); the message types in
//! this crate are the JSON bodies exchanged over HTTP.

pub mod deadline;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod rpc;

pub use deadline::call_with_deadline;
pub use endpoint::{endpoints, HealthResponse};
pub use error::{RpcError, RpcResult};
pub use message::{
    AdjustBalanceRequest, AdjustBalanceResponse, AdjustMode, BalanceResponse, ErrorBody,
    ErrorCode, EscrowResponse, LockCreditsRequest, OpenAccountRequest,
    RefundLockedCreditsRequest, ReleaseLockedCreditsRequest, PROTOCOL_VERSION,
};
pub use rpc::{EscrowRpc, LedgerRpc};
