//! Escrow store for the Speakin payment service.
//!
//! An escrow record holds a student's credits for one booking between the
//! booking being confirmed and the session being settled. Records move from
//! `locked` to exactly one of `released` (tutor paid per the payout policy)
//! or `refunded` (student made whole by the booking service). Every status
//! change is a compare-and-set on the current status.
//!
//! The crate also settles credit purchases: a completed checkout credits the
//! buyer's balance once per payment reference.

pub mod error;
pub mod memory;
pub mod purchase;
pub mod rpc;
pub mod service;
pub mod store;

pub use error::{EscrowError, EscrowResult};
pub use memory::InMemoryEscrowStore;
pub use purchase::{PurchaseRecord, PurchaseSettlement, PurchaseStatus, SettlePurchaseRequest};
pub use rpc::LocalEscrow;
pub use service::EscrowService;
pub use store::{EscrowStore, LockOutcome};
