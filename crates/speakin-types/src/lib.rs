//! Foundation types for Speakin credits settlement.
//!
//! Every other Speakin crate depends on `speakin-types`. The types here are
//! shared by the account ledger, the escrow store, and the booking service,
//! and travel on the wire between them.
//!
//! # Key Types
//!
//! - [`AccountId`], [`BookingId`], [`SlotId`]: numeric identifiers
//! - [`SessionType`]: trial or standard lesson
//! - [`PayoutPolicy`]: tutor share of released escrow per session type
//! - [`BookingStatus`], [`EscrowStatus`]: lifecycle states
//! - [`EscrowRecord`]: credits held for one booking
//! - [`RoomName`]: video room identifier derived for a booking
//! - [`Clock`]: injectable time source

pub mod error;
pub mod escrow;
pub mod identity;
pub mod payout;
pub mod room;
pub mod session;
pub mod status;
pub mod temporal;

pub use error::TypeError;
pub use escrow::EscrowRecord;
pub use identity::{AccountId, BookingId, SlotId};
pub use payout::{PayoutPolicy, PayoutShare};
pub use room::RoomName;
pub use session::SessionType;
pub use status::{BookingStatus, EscrowStatus, Party};
pub use temporal::{Clock, FixedClock, SystemClock};

/// Whole credits. Balances are never negative.
pub type Credits = u64;
