use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::{AccountId, BookingId};
use crate::status::EscrowStatus;
use crate::Credits;

/// Credits held by the payment service on behalf of one booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRecord {
    pub booking_id: BookingId,
    pub student_id: AccountId,
    pub tutor_id: AccountId,
    pub credits_locked: Credits,
    pub status: EscrowStatus,
    pub created_at: DateTime<Utc>,
    /// Stamped on release and on refund.
    pub released_at: Option<DateTime<Utc>>,
}

impl EscrowRecord {
    /// A fresh record in `Locked`.
    pub fn locked(
        booking_id: BookingId,
        student_id: AccountId,
        tutor_id: AccountId,
        credits_locked: Credits,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            booking_id,
            student_id,
            tutor_id,
            credits_locked,
            status: EscrowStatus::Locked,
            created_at: now,
            released_at: None,
        }
    }

    /// Same booking, parties, and amount; status and timestamps ignored.
    pub fn same_terms(&self, other: &EscrowRecord) -> bool {
        self.booking_id == other.booking_id
            && self.student_id == other.student_id
            && self.tutor_id == other.tutor_id
            && self.credits_locked == other.credits_locked
    }

    pub fn involves(&self, account: AccountId) -> bool {
        self.student_id == account || self.tutor_id == account
    }
}
