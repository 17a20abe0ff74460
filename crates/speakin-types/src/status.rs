use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Lifecycle of a booking.
///
/// `Confirmed` is entered together with the escrow lock. Every other state
/// except `Ongoing` is terminal and coincides with the escrow record being
/// released or refunded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    Ongoing,
    Completed,
    CanceledByStudent,
    CanceledByTutor,
    NoShowByStudent,
    NoShowByTutor,
    /// Neither party joined within the window.
    NoShowBoth,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 8] = [
        Self::Confirmed,
        Self::Ongoing,
        Self::Completed,
        Self::CanceledByStudent,
        Self::CanceledByTutor,
        Self::NoShowByStudent,
        Self::NoShowByTutor,
        Self::NoShowBoth,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
            Self::CanceledByStudent => "canceled_by_student",
            Self::CanceledByTutor => "canceled_by_tutor",
            Self::NoShowByStudent => "no_show_by_student",
            Self::NoShowByTutor => "no_show_by_tutor",
            Self::NoShowBoth => "no_show_both",
        }
    }

    /// Holds a slot and a locked escrow record.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Confirmed | Self::Ongoing)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    pub fn is_canceled(self) -> bool {
        matches!(self, Self::CanceledByStudent | Self::CanceledByTutor)
    }

    /// Canceled variant for the party that initiated the cancellation.
    pub fn canceled_by(party: Party) -> Self {
        match party {
            Party::Student => Self::CanceledByStudent,
            Party::Tutor => Self::CanceledByTutor,
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| TypeError::UnknownStatus(s.to_string()))
    }
}

/// Lifecycle of an escrow record. `Locked` is the only non-terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    Locked,
    Released,
    Refunded,
}

impl EscrowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::Released => "released",
            Self::Refunded => "refunded",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Locked)
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side of a booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Student,
    Tutor,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Student => f.write_str("student"),
            Self::Tutor => f.write_str("tutor"),
        }
    }
}
