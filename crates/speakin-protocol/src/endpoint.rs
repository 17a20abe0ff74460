/// HTTP endpoint paths. Patterns use axum's `:param` syntax; the functions
/// build concrete paths for clients.
pub mod endpoints {
    use speakin_types::{AccountId, BookingId, SlotId};

    pub const HEALTH: &str = "/v1/health";

    // Account service
    pub const ACCOUNTS: &str = "/v1/accounts";
    pub const ACCOUNT_BALANCE: &str = "/v1/accounts/:account_id/balance";
    pub const ACCOUNT_ADJUST: &str = "/v1/accounts/:account_id/adjust";

    // Payment service
    pub const ESCROW_LOCK: &str = "/v1/escrow/lock";
    pub const ESCROW_REFUND: &str = "/v1/escrow/refund";
    pub const ESCROW_RELEASE: &str = "/v1/escrow/release";
    pub const ESCROWS: &str = "/v1/escrow";
    pub const ESCROW_BY_BOOKING: &str = "/v1/escrow/:booking_id";
    pub const PURCHASES: &str = "/v1/purchases";

    // Session service
    pub const SLOTS: &str = "/v1/slots";
    pub const SLOT: &str = "/v1/slots/:slot_id";
    pub const SLOT_CANCEL: &str = "/v1/slots/:slot_id/cancel";
    pub const BOOKINGS: &str = "/v1/bookings";
    pub const BOOKING: &str = "/v1/bookings/:booking_id";
    pub const BOOKING_CANCEL: &str = "/v1/bookings/:booking_id/cancel";
    pub const ADMIN_RECOVER: &str = "/v1/admin/recover";

    pub fn account_balance(account: AccountId) -> String {
        format!("/v1/accounts/{account}/balance")
    }

    pub fn account_adjust(account: AccountId) -> String {
        format!("/v1/accounts/{account}/adjust")
    }

    pub fn escrow_by_booking(booking: BookingId) -> String {
        format!("/v1/escrow/{booking}")
    }

    pub fn slot(slot: SlotId) -> String {
        format!("/v1/slots/{slot}")
    }

    pub fn booking(booking: BookingId) -> String {
        format!("/v1/bookings/{booking}")
    }
}

/// Health check response.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub protocol_version: u32,
}

impl HealthResponse {
    pub fn for_service(service: impl Into<String>) -> Self {
        Self { service: service.into(), ..Self::default() }
    }
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".into(),
            service: "speakin".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            protocol_version: super::message::PROTOCOL_VERSION,
        }
    }
}
