use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::Deserialize;

use speakin_escrow::{PurchaseRecord, SettlePurchaseRequest};
use speakin_protocol::{
    EscrowResponse, LockCreditsRequest, RefundLockedCreditsRequest, ReleaseLockedCreditsRequest,
};
use speakin_types::{AccountId, BookingId, EscrowRecord};

use crate::error::ServerResult;
use crate::state::EscrowState;

#[derive(Debug, Deserialize)]
pub struct AccountQuery {
    pub account_id: AccountId,
}

pub async fn lock(
    State(state): State<EscrowState>,
    Json(request): Json<LockCreditsRequest>,
) -> ServerResult<Json<EscrowResponse>> {
    Ok(Json(state.service.lock(&request).await?))
}

pub async fn refund(
    State(state): State<EscrowState>,
    Json(request): Json<RefundLockedCreditsRequest>,
) -> ServerResult<Json<EscrowResponse>> {
    Ok(Json(state.service.refund(request.booking_id).await?))
}

pub async fn release(
    State(state): State<EscrowState>,
    Json(request): Json<ReleaseLockedCreditsRequest>,
) -> ServerResult<Json<EscrowResponse>> {
    Ok(Json(state.service.release(&request).await?))
}

pub async fn get(
    State(state): State<EscrowState>,
    Path(booking_id): Path<BookingId>,
) -> ServerResult<Json<EscrowRecord>> {
    Ok(Json(state.service.get(booking_id)?))
}

pub async fn list(
    State(state): State<EscrowState>,
    Query(query): Query<AccountQuery>,
) -> ServerResult<Json<Vec<EscrowRecord>>> {
    Ok(Json(state.service.list(query.account_id)?))
}

pub async fn settle_purchase(
    State(state): State<EscrowState>,
    Json(request): Json<SettlePurchaseRequest>,
) -> ServerResult<Json<PurchaseRecord>> {
    Ok(Json(state.purchases.settle(&request).await?))
}

pub async fn list_purchases(
    State(state): State<EscrowState>,
    Query(query): Query<AccountQuery>,
) -> Json<Vec<PurchaseRecord>> {
    Json(state.purchases.list_for_account(query.account_id))
}
