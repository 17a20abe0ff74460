use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::{AccountId, BookingId};

/// Video room identifier attached to a confirmed booking.
///
/// Derived with BLAKE3 over the booking participants plus random entropy,
/// so names are unguessable and never repeat across re-bookings.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomName(String);

impl RoomName {
    const HEX_LEN: usize = 24;

    pub fn generate(booking: BookingId, tutor: AccountId, student: AccountId) -> Self {
        let mut entropy = [0u8; 16];
        rand::Rng::fill(&mut rand::thread_rng(), &mut entropy);
        Self::derive(booking, tutor, student, &entropy)
    }

    /// Deterministic derivation from explicit entropy.
    pub fn derive(booking: BookingId, tutor: AccountId, student: AccountId, entropy: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"speakin-room-v1:");
        hasher.update(&booking.get().to_le_bytes());
        hasher.update(&tutor.get().to_le_bytes());
        hasher.update(&student.get().to_le_bytes());
        hasher.update(entropy);
        let digest = hex::encode(hasher.finalize().as_bytes());
        Self(format!("room-{}", &digest[..Self::HEX_LEN]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join URL under the given base, e.g. `https://video.example/room-...`.
    pub fn link(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.0)
    }
}

impl fmt::Debug for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoomName({})", self.0)
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
