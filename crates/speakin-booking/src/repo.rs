use chrono::{DateTime, Utc};

use speakin_types::{AccountId, BookingId, SlotId};

use crate::error::BookingResult;
use crate::model::{AvailabilitySlot, Booking, BookingFilter, NewSlot};

/// Local store of slots and bookings for the session service.
///
/// Methods that touch both a slot and a booking must apply both writes
/// atomically.
pub trait BookingRepository: Send + Sync {
    /// Reserve an id for a booking that is not persisted yet.
    fn next_booking_id(&self) -> BookingResult<BookingId>;

    fn insert_slot(&self, slot: NewSlot, now: DateTime<Utc>) -> BookingResult<AvailabilitySlot>;

    /// Delete a slot that no booking references.
    fn remove_slot(&self, id: SlotId) -> BookingResult<AvailabilitySlot>;

    fn slot(&self, id: SlotId) -> BookingResult<Option<AvailabilitySlot>>;

    /// Slots ordered by start time, optionally for one tutor.
    fn slots(&self, tutor: Option<AccountId>) -> BookingResult<Vec<AvailabilitySlot>>;

    fn booking(&self, id: BookingId) -> BookingResult<Option<Booking>>;

    /// Bookings ordered by creation time.
    fn bookings(&self, filter: &BookingFilter) -> BookingResult<Vec<Booking>>;

    /// Insert a confirmed booking and mark its slot booked. Fails with a
    /// conflict when the slot is already booked.
    fn confirm_booking(&self, booking: Booking) -> BookingResult<Booking>;

    /// Overwrite a booking and, when given, its slot's `is_booked` flag.
    fn save_booking(&self, booking: &Booking, slot_booked: Option<bool>) -> BookingResult<()>;
}
