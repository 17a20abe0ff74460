use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use speakin_types::{
    AccountId, BookingId, BookingStatus, Credits, RoomName, SessionType, SlotId,
};

/// A tutor's published availability.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub id: SlotId,
    pub tutor_id: AccountId,
    pub session_type: SessionType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub credits_required: Credits,
    pub is_booked: bool,
    pub created_at: DateTime<Utc>,
}

impl AvailabilitySlot {
    /// Half-open interval overlap with `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && start < self.end_time
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_time
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }
}

/// Slot creation request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSlot {
    pub tutor_id: AccountId,
    pub session_type: SessionType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub credits_required: Credits,
}

/// A student's reservation of a slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub availability_id: SlotId,
    pub student_id: AccountId,
    pub booking_status: BookingStatus,
    pub canceled_at: Option<DateTime<Utc>>,
    /// Credits went back to the student.
    pub refund_status: bool,
    pub room_name: RoomName,
    pub video_call_link: String,
    pub student_joined_at: Option<DateTime<Utc>>,
    pub tutor_joined_at: Option<DateTime<Utc>>,
    pub student_joined_within_5min: bool,
    pub tutor_joined_within_5min: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn confirmed(
        id: BookingId,
        slot: &AvailabilitySlot,
        student_id: AccountId,
        room_name: RoomName,
        video_call_link: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            availability_id: slot.id,
            student_id,
            booking_status: BookingStatus::Confirmed,
            canceled_at: None,
            refund_status: false,
            room_name,
            video_call_link,
            student_joined_at: None,
            tutor_joined_at: None,
            student_joined_within_5min: false,
            tutor_joined_within_5min: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Booking creation request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub availability_id: SlotId,
    pub student_id: AccountId,
}

/// Partial update of a booking: join times and an optional status change.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingUpdate {
    #[serde(default)]
    pub student_joined_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tutor_joined_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub booking_status: Option<BookingStatus>,
}

/// Booking query; unset fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingFilter {
    pub student_id: Option<AccountId>,
    pub slot_id: Option<SlotId>,
    pub status: Option<BookingStatus>,
}

impl BookingFilter {
    pub fn student(student_id: AccountId) -> Self {
        Self { student_id: Some(student_id), ..Self::default() }
    }

    pub fn slot(slot_id: SlotId) -> Self {
        Self { slot_id: Some(slot_id), ..Self::default() }
    }

    pub fn matches(&self, booking: &Booking) -> bool {
        self.student_id.map_or(true, |s| booking.student_id == s)
            && self.slot_id.map_or(true, |s| booking.availability_id == s)
            && self.status.map_or(true, |s| booking.booking_status == s)
    }
}
