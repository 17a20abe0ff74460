use chrono::{DateTime, Utc};

use speakin_types::{AccountId, BookingId, Credits, EscrowRecord, EscrowStatus};

use crate::error::EscrowResult;

/// Outcome of inserting a locked record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockOutcome {
    pub record: EscrowRecord,
    /// `false` when an identical locked record was already present.
    pub created: bool,
}

/// Persistence boundary for escrow records, one record per booking.
///
/// Implementations must make [`EscrowStore::transition`] atomic: the status
/// check and the write happen under the same lock or transaction.
pub trait EscrowStore: Send + Sync {
    /// Insert `record` in `locked`. An identical locked record is reused;
    /// any other existing record for the booking is a conflict.
    fn insert_locked(&self, record: EscrowRecord) -> EscrowResult<LockOutcome>;

    /// Compare-and-set the status from `expected` to `next`. Moving to a
    /// terminal status stamps `released_at`; moving back to `locked` clears it.
    fn transition(
        &self,
        booking: BookingId,
        expected: EscrowStatus,
        next: EscrowStatus,
        at: DateTime<Utc>,
    ) -> EscrowResult<EscrowRecord>;

    fn get(&self, booking: BookingId) -> EscrowResult<Option<EscrowRecord>>;

    /// Records where the account is the student or the tutor, oldest first.
    fn list_for_account(&self, account: AccountId) -> EscrowResult<Vec<EscrowRecord>>;

    /// Credits currently held in `locked` records.
    fn locked_total(&self) -> EscrowResult<Credits>;
}
