use chrono::{DateTime, Duration, Utc};

use speakin_saga::Settlement;
use speakin_types::{BookingStatus, Credits, SessionType};

use crate::policy::{BookingPolicy, NoShowBothPolicy};

/// On-time window around a slot's start, inclusive at both ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JoinWindow {
    pub half_width: Duration,
}

impl JoinWindow {
    pub fn new(half_width: Duration) -> Self {
        Self { half_width }
    }

    pub fn contains(&self, start: DateTime<Utc>, joined_at: DateTime<Utc>) -> bool {
        let delta = joined_at - start;
        delta >= -self.half_width && delta <= self.half_width
    }
}

/// Who joined on time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attendance {
    Both,
    TutorOnly,
    StudentOnly,
    Neither,
}

impl Attendance {
    pub fn from_flags(student_on_time: bool, tutor_on_time: bool) -> Self {
        match (student_on_time, tutor_on_time) {
            (true, true) => Self::Both,
            (false, true) => Self::TutorOnly,
            (true, false) => Self::StudentOnly,
            (false, false) => Self::Neither,
        }
    }
}

/// Terminal status and escrow settlement for a finished session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub status: BookingStatus,
    pub settlement: Settlement,
}

impl Resolution {
    pub fn resolve(
        attendance: Attendance,
        session_type: SessionType,
        credits: Credits,
        policy: &BookingPolicy,
    ) -> Self {
        let release = Settlement::Release { session_type };
        match attendance {
            Attendance::Both => Self { status: BookingStatus::Completed, settlement: release },
            Attendance::TutorOnly => Self { status: BookingStatus::NoShowByStudent, settlement: release },
            Attendance::StudentOnly => Self {
                status: BookingStatus::NoShowByTutor,
                settlement: Settlement::Refund {
                    credit: credits + policy.no_show_bonus(credits),
                },
            },
            Attendance::Neither => Self {
                status: BookingStatus::NoShowBoth,
                settlement: match policy.no_show_both {
                    NoShowBothPolicy::RefundStudent => Settlement::Refund { credit: credits },
                    NoShowBothPolicy::ReleaseToTutor => release,
                },
            },
        }
    }
}
