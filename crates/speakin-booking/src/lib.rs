//! Booking state machine and settlement orchestrator for the Speakin
//! session service.
//!
//! Tutors publish availability slots; students book them with credits. The
//! [`SettlementOrchestrator`] sequences every booking transition with the
//! account service (balance ledger) and the payment service (escrow store):
//!
//! - creation: check balance, deduct, lock escrow, confirm locally
//! - cancellation: refund escrow, credit the student, cancel locally
//! - completion: release or refund escrow depending on who joined on time
//!
//! Each cross-service sequence is a saga recorded in a durable step log, so
//! a crash mid-way is repaired by [`SettlementOrchestrator::recover`].

pub mod attendance;
pub mod error;
pub mod locks;
pub mod memory;
pub mod model;
pub mod notify;
pub mod orchestrator;
pub mod policy;
pub mod recovery;
pub mod repo;
pub mod rules;

#[cfg(test)]
mod scenarios;

pub use attendance::{Attendance, JoinWindow, Resolution};
pub use error::{BookingError, BookingResult};
pub use memory::InMemoryBookingRepository;
pub use model::{AvailabilitySlot, Booking, BookingFilter, BookingRequest, BookingUpdate, NewSlot};
pub use notify::{
    LogPublisher, MemoryPublisher, Notification, NotificationKind, NotificationPublisher,
    Notifier, PublishError, RetryPolicy, WebhookPublisher,
};
pub use orchestrator::SettlementOrchestrator;
pub use policy::{BookingPolicy, NoShowBothPolicy};
pub use recovery::RecoveryReport;
pub use repo::BookingRepository;
