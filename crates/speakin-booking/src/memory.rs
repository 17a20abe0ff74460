use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::debug;

use speakin_types::{AccountId, BookingId, SlotId};

use crate::error::{BookingError, BookingResult};
use crate::model::{AvailabilitySlot, Booking, BookingFilter, NewSlot};
use crate::repo::BookingRepository;

/// In-memory repository. One lock covers slots and bookings, which makes
/// every method a single transaction.
pub struct InMemoryBookingRepository {
    inner: RwLock<RepoState>,
}

#[derive(Default)]
struct RepoState {
    slots: BTreeMap<SlotId, AvailabilitySlot>,
    bookings: BTreeMap<BookingId, Booking>,
    next_slot: u64,
    next_booking: u64,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RepoState::default()),
        }
    }

    fn read(&self) -> BookingResult<std::sync::RwLockReadGuard<'_, RepoState>> {
        self.inner
            .read()
            .map_err(|_| BookingError::Storage("repository lock poisoned".into()))
    }

    fn write(&self) -> BookingResult<std::sync::RwLockWriteGuard<'_, RepoState>> {
        self.inner
            .write()
            .map_err(|_| BookingError::Storage("repository lock poisoned".into()))
    }
}

impl Default for InMemoryBookingRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingRepository for InMemoryBookingRepository {
    fn next_booking_id(&self) -> BookingResult<BookingId> {
        let mut state = self.write()?;
        state.next_booking += 1;
        Ok(BookingId::new(state.next_booking))
    }

    fn insert_slot(&self, slot: NewSlot, now: DateTime<Utc>) -> BookingResult<AvailabilitySlot> {
        let mut state = self.write()?;
        state.next_slot += 1;
        let slot = AvailabilitySlot {
            id: SlotId::new(state.next_slot),
            tutor_id: slot.tutor_id,
            session_type: slot.session_type,
            start_time: slot.start_time,
            end_time: slot.end_time,
            credits_required: slot.credits_required,
            is_booked: false,
            created_at: now,
        };
        state.slots.insert(slot.id, slot.clone());
        Ok(slot)
    }

    fn remove_slot(&self, id: SlotId) -> BookingResult<AvailabilitySlot> {
        let mut state = self.write()?;
        if state.bookings.values().any(|b| b.availability_id == id) {
            return Err(BookingError::Conflict(format!(
                "slot {id} is referenced by bookings"
            )));
        }
        state
            .slots
            .remove(&id)
            .ok_or_else(|| BookingError::NotFound(format!("slot {id}")))
    }

    fn slot(&self, id: SlotId) -> BookingResult<Option<AvailabilitySlot>> {
        Ok(self.read()?.slots.get(&id).cloned())
    }

    fn slots(&self, tutor: Option<AccountId>) -> BookingResult<Vec<AvailabilitySlot>> {
        let state = self.read()?;
        let mut slots: Vec<AvailabilitySlot> = state
            .slots
            .values()
            .filter(|s| tutor.map_or(true, |t| s.tutor_id == t))
            .cloned()
            .collect();
        slots.sort_by_key(|s| (s.start_time, s.id));
        Ok(slots)
    }

    fn booking(&self, id: BookingId) -> BookingResult<Option<Booking>> {
        Ok(self.read()?.bookings.get(&id).cloned())
    }

    fn bookings(&self, filter: &BookingFilter) -> BookingResult<Vec<Booking>> {
        let state = self.read()?;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        bookings.sort_by_key(|b| (b.created_at, b.id));
        Ok(bookings)
    }

    fn confirm_booking(&self, booking: Booking) -> BookingResult<Booking> {
        let mut state = self.write()?;
        if state.bookings.contains_key(&booking.id) {
            return Err(BookingError::Conflict(format!("booking {} already exists", booking.id)));
        }
        let slot = state
            .slots
            .get_mut(&booking.availability_id)
            .ok_or_else(|| BookingError::NotFound(format!("slot {}", booking.availability_id)))?;
        if slot.is_booked {
            return Err(BookingError::Conflict(format!("slot {} is already booked", slot.id)));
        }
        slot.is_booked = true;
        state.bookings.insert(booking.id, booking.clone());
        debug!(booking = %booking.id.short_id(), slot = %booking.availability_id.short_id(), "booking confirmed");
        Ok(booking)
    }

    fn save_booking(&self, booking: &Booking, slot_booked: Option<bool>) -> BookingResult<()> {
        let mut state = self.write()?;
        if !state.bookings.contains_key(&booking.id) {
            return Err(BookingError::NotFound(format!("booking {}", booking.id)));
        }
        if let Some(is_booked) = slot_booked {
            let slot = state
                .slots
                .get_mut(&booking.availability_id)
                .ok_or_else(|| BookingError::NotFound(format!("slot {}", booking.availability_id)))?;
            slot.is_booked = is_booked;
        }
        state.bookings.insert(booking.id, booking.clone());
        Ok(())
    }
}
