use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::debug;

use speakin_types::{AccountId, BookingId, Credits, EscrowRecord, EscrowStatus};

use crate::error::{EscrowError, EscrowResult};
use crate::store::{EscrowStore, LockOutcome};

/// In-memory escrow store keyed by booking.
///
/// Intended for tests and single-node serving. Records live behind a
/// `RwLock`; transitions take the write lock for the whole compare-and-set.
pub struct InMemoryEscrowStore {
    records: RwLock<BTreeMap<BookingId, EscrowRecord>>,
}

impl InMemoryEscrowStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of records of any status.
    pub fn len(&self) -> usize {
        self.records.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().expect("lock poisoned").is_empty()
    }
}

impl Default for InMemoryEscrowStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryEscrowStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEscrowStore")
            .field("records", &self.len())
            .finish()
    }
}

impl EscrowStore for InMemoryEscrowStore {
    fn insert_locked(&self, record: EscrowRecord) -> EscrowResult<LockOutcome> {
        let mut map = self.records.write().expect("lock poisoned");
        if let Some(existing) = map.get(&record.booking_id) {
            if existing.status == EscrowStatus::Locked && existing.same_terms(&record) {
                return Ok(LockOutcome {
                    record: existing.clone(),
                    created: false,
                });
            }
            let reason = if existing.status == EscrowStatus::Locked {
                "a locked record with different terms exists".to_string()
            } else {
                format!("booking already settled as {}", existing.status)
            };
            return Err(EscrowError::Conflict {
                booking: record.booking_id,
                reason,
            });
        }

        let mut record = record;
        record.status = EscrowStatus::Locked;
        record.released_at = None;
        map.insert(record.booking_id, record.clone());
        Ok(LockOutcome {
            record,
            created: true,
        })
    }

    fn transition(
        &self,
        booking: BookingId,
        expected: EscrowStatus,
        next: EscrowStatus,
        at: DateTime<Utc>,
    ) -> EscrowResult<EscrowRecord> {
        let mut map = self.records.write().expect("lock poisoned");
        let record = map.get_mut(&booking).ok_or(EscrowError::NotFound(booking))?;
        if record.status != expected {
            return Err(EscrowError::StatusMismatch {
                booking,
                expected,
                actual: record.status,
            });
        }
        record.status = next;
        record.released_at = if next.is_terminal() { Some(at) } else { None };
        debug!(booking = %booking.short_id(), from = %expected, to = %next, "escrow transition");
        Ok(record.clone())
    }

    fn get(&self, booking: BookingId) -> EscrowResult<Option<EscrowRecord>> {
        let map = self.records.read().expect("lock poisoned");
        Ok(map.get(&booking).cloned())
    }

    fn list_for_account(&self, account: AccountId) -> EscrowResult<Vec<EscrowRecord>> {
        let map = self.records.read().expect("lock poisoned");
        let mut records: Vec<EscrowRecord> =
            map.values().filter(|r| r.involves(account)).cloned().collect();
        records.sort_by_key(|r| (r.created_at, r.booking_id));
        Ok(records)
    }

    fn locked_total(&self) -> EscrowResult<Credits> {
        let map = self.records.read().expect("lock poisoned");
        Ok(map
            .values()
            .filter(|r| r.status == EscrowStatus::Locked)
            .map(|r| r.credits_locked)
            .sum())
    }
}
