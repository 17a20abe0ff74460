use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// How a session neither party joined is settled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoShowBothPolicy {
    /// Refund the student in full, without the no-show bonus.
    #[default]
    RefundStudent,
    /// Pay the tutor as if the session had taken place.
    ReleaseToTutor,
}

/// Tunables of the booking state machine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingPolicy {
    /// Half-width of the on-time join window around the slot start.
    pub join_window_minutes: i64,
    /// A student cancellation at least this long before the start reopens
    /// the slot.
    pub cancellation_cutoff_hours: i64,
    /// Extra credit, in percent of the price, for a student whose tutor
    /// did not show up.
    pub no_show_bonus_percent: u64,
    pub no_show_both: NoShowBothPolicy,
    /// Deadline for each ledger or escrow call.
    pub rpc_timeout_secs: u64,
    /// Base of the video call link handed to both parties.
    pub video_base_url: String,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            join_window_minutes: 5,
            cancellation_cutoff_hours: 3,
            no_show_bonus_percent: 10,
            no_show_both: NoShowBothPolicy::default(),
            rpc_timeout_secs: 10,
            video_base_url: "https://meet.speakin.app".to_string(),
        }
    }
}

impl BookingPolicy {
    pub fn join_window(&self) -> Duration {
        Duration::minutes(self.join_window_minutes)
    }

    pub fn cancellation_cutoff(&self) -> Duration {
        Duration::hours(self.cancellation_cutoff_hours)
    }

    pub fn rpc_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.rpc_timeout_secs)
    }

    /// Bonus for `credits` when the tutor missed the session, rounded down.
    pub fn no_show_bonus(&self, credits: u64) -> u64 {
        ((credits as u128 * self.no_show_bonus_percent as u128) / 100) as u64
    }
}
