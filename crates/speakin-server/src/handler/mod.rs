//! Request handlers, one module per service.

pub mod booking;
pub mod escrow;
pub mod ledger;

use axum::response::Json;

use speakin_protocol::HealthResponse;

pub async fn ledger_health() -> Json<HealthResponse> {
    Json(HealthResponse::for_service("ledger"))
}

pub async fn escrow_health() -> Json<HealthResponse> {
    Json(HealthResponse::for_service("escrow"))
}

pub async fn booking_health() -> Json<HealthResponse> {
    Json(HealthResponse::for_service("booking"))
}
