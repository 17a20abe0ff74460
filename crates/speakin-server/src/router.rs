use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use speakin_protocol::endpoints;

use crate::handler::{self, booking, escrow, ledger};
use crate::state::{BookingState, EscrowState, LedgerState};

/// Account service routes.
pub fn build_ledger_router(state: LedgerState) -> Router {
    Router::new()
        .route(endpoints::HEALTH, get(handler::ledger_health))
        .route(endpoints::ACCOUNTS, get(ledger::list_accounts).post(ledger::open_account))
        .route(endpoints::ACCOUNT_BALANCE, get(ledger::balance))
        .route(endpoints::ACCOUNT_ADJUST, post(ledger::adjust))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Payment service routes.
pub fn build_escrow_router(state: EscrowState) -> Router {
    Router::new()
        .route(endpoints::HEALTH, get(handler::escrow_health))
        .route(endpoints::ESCROW_LOCK, post(escrow::lock))
        .route(endpoints::ESCROW_REFUND, post(escrow::refund))
        .route(endpoints::ESCROW_RELEASE, post(escrow::release))
        .route(endpoints::ESCROWS, get(escrow::list))
        .route(endpoints::ESCROW_BY_BOOKING, get(escrow::get))
        .route(endpoints::PURCHASES, get(escrow::list_purchases).post(escrow::settle_purchase))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Session service routes. Everything except health needs a bearer token.
pub fn build_booking_router(state: BookingState) -> Router {
    Router::new()
        .route(endpoints::HEALTH, get(handler::booking_health))
        .route(endpoints::SLOTS, get(booking::list_slots).post(booking::create_slot))
        .route(endpoints::SLOT, get(booking::get_slot).delete(booking::remove_slot))
        .route(endpoints::SLOT_CANCEL, post(booking::cancel_slot))
        .route(endpoints::BOOKINGS, get(booking::list_bookings).post(booking::create_booking))
        .route(endpoints::BOOKING, get(booking::get_booking).patch(booking::update_booking))
        .route(endpoints::BOOKING_CANCEL, post(booking::cancel_booking))
        .route(endpoints::ADMIN_RECOVER, post(booking::recover))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
