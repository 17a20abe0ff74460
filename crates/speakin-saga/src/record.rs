use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use speakin_types::{AccountId, BookingId, BookingStatus, Credits, SessionType, SlotId};

/// Which booking transition a saga drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SagaKind {
    /// Deduct, lock, confirm.
    Create,
    /// Refund and credit back after a cancellation.
    Cancel,
    /// Release or refund when the session is marked completed.
    Settle,
}

impl fmt::Display for SagaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Cancel => "cancel",
            Self::Settle => "settle",
        };
        f.write_str(s)
    }
}

/// A booking has at most one saga of each kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SagaId {
    pub booking_id: BookingId,
    pub kind: SagaKind,
}

impl SagaId {
    pub fn new(booking_id: BookingId, kind: SagaKind) -> Self {
        Self { booking_id, kind }
    }
}

impl fmt::Display for SagaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.booking_id.short_id(), self.kind)
    }
}

/// How the escrow record of a finished booking is settled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Settlement {
    /// Pay the tutor per the payout policy.
    Release { session_type: SessionType },
    /// Refund the escrow and credit the student `credit`.
    Refund { credit: Credits },
}

impl Settlement {
    /// The step recorded once escrow has been settled this way.
    pub fn escrow_step(&self) -> SagaStep {
        match self {
            Self::Release { .. } => SagaStep::EscrowReleased,
            Self::Refund { .. } => SagaStep::EscrowRefunded,
        }
    }

    /// Credits owed to the student after the escrow step.
    pub fn student_credit(&self) -> Option<Credits> {
        match self {
            Self::Release { .. } => None,
            Self::Refund { credit } => Some(*credit),
        }
    }
}

/// Everything needed to finish or undo a saga without the original request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SagaPlan {
    Create {
        slot_id: SlotId,
        student_id: AccountId,
        tutor_id: AccountId,
        session_type: SessionType,
        credits: Credits,
    },
    Terminate {
        slot_id: SlotId,
        student_id: AccountId,
        target: BookingStatus,
        settlement: Settlement,
        /// Free the slot for other students once committed.
        reopen_slot: bool,
        decided_at: DateTime<Utc>,
    },
}

/// One durable fact about a saga.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SagaStep {
    /// Recorded before the first remote call.
    Begun(SagaPlan),
    BalanceDeducted,
    EscrowLocked,
    EscrowRefunded,
    EscrowReleased,
    BalanceCredited,
    /// The local booking write is done; the saga is finished.
    Committed,
    /// Undo has started.
    Compensating { reason: String },
    /// The escrow lock taken by a create saga was refunded.
    LockReverted,
    /// The deduction taken by a create saga was credited back.
    DeductionReversed,
    /// Undo is finished.
    Compensated,
    /// Closed before any remote effect.
    Aborted { reason: String },
}

impl SagaStep {
    /// Closes the saga.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Compensated | Self::Aborted { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Begun(_) => "begun",
            Self::BalanceDeducted => "balance_deducted",
            Self::EscrowLocked => "escrow_locked",
            Self::EscrowRefunded => "escrow_refunded",
            Self::EscrowReleased => "escrow_released",
            Self::BalanceCredited => "balance_credited",
            Self::Committed => "committed",
            Self::Compensating { .. } => "compensating",
            Self::LockReverted => "lock_reverted",
            Self::DeductionReversed => "deduction_reversed",
            Self::Compensated => "compensated",
            Self::Aborted { .. } => "aborted",
        }
    }
}

impl fmt::Display for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compensating { reason } | Self::Aborted { reason } => {
                write!(f, "{} ({reason})", self.label())
            }
            _ => f.write_str(self.label()),
        }
    }
}

/// A step stamped with its saga and time, as stored in the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaRecord {
    pub saga: SagaId,
    pub step: SagaStep,
    pub recorded_at: DateTime<Utc>,
}

impl SagaRecord {
    pub fn new(saga: SagaId, step: SagaStep, recorded_at: DateTime<Utc>) -> Self {
        Self { saga, step, recorded_at }
    }
}
