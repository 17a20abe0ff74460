use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use tracing::info;

use speakin_protocol::{
    AdjustBalanceRequest, AdjustBalanceResponse, AdjustMode, BalanceResponse, OpenAccountRequest,
};
use speakin_types::{AccountId, Credits};

use crate::error::{ServerError, ServerResult};
use crate::state::LedgerState;

/// Adjustment body. The account comes from the path; a body account, when
/// present, must agree with it.
#[derive(Debug, Deserialize)]
pub struct AdjustBody {
    #[serde(default)]
    pub account_id: Option<AccountId>,
    pub amount: Credits,
    pub mode: AdjustMode,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

pub async fn balance(
    State(state): State<LedgerState>,
    Path(account_id): Path<AccountId>,
) -> ServerResult<Json<BalanceResponse>> {
    let balance_credits = state.ledger.balance(account_id)?;
    Ok(Json(BalanceResponse { account_id, balance_credits }))
}

pub async fn adjust(
    State(state): State<LedgerState>,
    Path(account_id): Path<AccountId>,
    Json(body): Json<AdjustBody>,
) -> ServerResult<Json<AdjustBalanceResponse>> {
    if body.account_id.is_some_and(|id| id != account_id) {
        return Err(ServerError::BadRequest(format!("body account does not match path account {account_id}")));
    }
    let request = AdjustBalanceRequest {
        account_id,
        amount: body.amount,
        mode: body.mode,
        idempotency_key: body.idempotency_key,
    };
    let response = state.ledger.adjust(&request)?;
    info!(
        account = %account_id.short_id(),
        mode = ?request.mode,
        amount = request.amount,
        balance = response.balance_credits,
        replayed = response.replayed,
        "balance adjusted"
    );
    Ok(Json(response))
}

pub async fn open_account(
    State(state): State<LedgerState>,
    Json(request): Json<OpenAccountRequest>,
) -> ServerResult<(StatusCode, Json<BalanceResponse>)> {
    state.ledger.open_account(request.account_id, request.balance_credits)?;
    info!(account = %request.account_id.short_id(), balance = request.balance_credits, "account opened");
    Ok((
        StatusCode::CREATED,
        Json(BalanceResponse { account_id: request.account_id, balance_credits: request.balance_credits }),
    ))
}

pub async fn list_accounts(State(state): State<LedgerState>) -> ServerResult<Json<Vec<BalanceResponse>>> {
    let accounts = state
        .ledger
        .accounts()?
        .into_iter()
        .map(|a| BalanceResponse { account_id: a.account_id, balance_credits: a.balance_credits })
        .collect();
    Ok(Json(accounts))
}
