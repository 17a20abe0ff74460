use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use tracing::{info, warn};

use speakin_booking::{
    AvailabilitySlot, Booking, BookingFilter, BookingRequest, BookingUpdate, NewSlot,
    RecoveryReport,
};
use speakin_types::{AccountId, BookingId, BookingStatus, Party, SlotId};

use crate::auth::{initiator, Action, Authenticated};
use crate::error::{ServerError, ServerResult};
use crate::state::BookingState;

#[derive(Debug, Default, Deserialize)]
pub struct SlotQuery {
    pub tutor_id: Option<AccountId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BookingQuery {
    pub student_id: Option<AccountId>,
    pub tutor_id: Option<AccountId>,
    pub status: Option<BookingStatus>,
}

/// Optional cancel body; only admins need to name the initiator.
#[derive(Debug, Default, Deserialize)]
pub struct CancelBody {
    pub initiator: Option<Party>,
}

// -- slots ----------------------------------------------------------------

pub async fn create_slot(
    State(state): State<BookingState>,
    caller: Authenticated,
    Json(new): Json<NewSlot>,
) -> ServerResult<(StatusCode, Json<AvailabilitySlot>)> {
    caller.require(Action::ManageSlot { tutor_id: new.tutor_id }).await?;
    let slot = state.orchestrator.create_slot(new).await?;
    Ok((StatusCode::CREATED, Json(slot)))
}

pub async fn list_slots(
    State(state): State<BookingState>,
    _caller: Authenticated,
    Query(query): Query<SlotQuery>,
) -> ServerResult<Json<Vec<AvailabilitySlot>>> {
    Ok(Json(state.orchestrator.list_slots(query.tutor_id)?))
}

pub async fn get_slot(
    State(state): State<BookingState>,
    _caller: Authenticated,
    Path(slot_id): Path<SlotId>,
) -> ServerResult<Json<AvailabilitySlot>> {
    Ok(Json(state.orchestrator.get_slot(slot_id)?))
}

pub async fn remove_slot(
    State(state): State<BookingState>,
    caller: Authenticated,
    Path(slot_id): Path<SlotId>,
) -> ServerResult<Json<AvailabilitySlot>> {
    let slot = state.orchestrator.get_slot(slot_id)?;
    caller.require(Action::ManageSlot { tutor_id: slot.tutor_id }).await?;
    Ok(Json(state.orchestrator.remove_slot(slot_id).await?))
}

/// Cancel whatever booking holds the slot.
pub async fn cancel_slot(
    State(state): State<BookingState>,
    caller: Authenticated,
    Path(slot_id): Path<SlotId>,
    body: Option<Json<CancelBody>>,
) -> ServerResult<Json<Booking>> {
    let requested = body.and_then(|Json(b)| b.initiator);
    let slot = state.orchestrator.get_slot(slot_id)?;
    let bookings = state.orchestrator.list_bookings(&BookingFilter::slot(slot_id))?;
    let holder = bookings
        .iter()
        .find(|b| b.booking_status == BookingStatus::Confirmed)
        .or(bookings.last());
    let party = match holder {
        Some(booking) => initiator(&caller.identity, booking.student_id, slot.tutor_id, requested)?,
        None => {
            caller.require(Action::ManageSlot { tutor_id: slot.tutor_id }).await?;
            requested.unwrap_or(Party::Tutor)
        }
    };
    let booking = state.orchestrator.cancel_slot_booking(slot_id, party).await?;
    info!(slot = %slot_id.short_id(), booking = %booking.id.short_id(), by = %party, "slot booking canceled");
    Ok(Json(booking))
}

// -- bookings -------------------------------------------------------------

pub async fn create_booking(
    State(state): State<BookingState>,
    caller: Authenticated,
    Json(request): Json<BookingRequest>,
) -> ServerResult<(StatusCode, Json<Booking>)> {
    caller.require(Action::Book { student_id: request.student_id }).await?;
    let booking = state.orchestrator.create_booking(request).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// Non-admins see only bookings they take part in; with no filter that
/// means their own bookings as a student.
pub async fn list_bookings(
    State(state): State<BookingState>,
    caller: Authenticated,
    Query(query): Query<BookingQuery>,
) -> ServerResult<Json<Vec<Booking>>> {
    let me = caller.identity.user_id;
    let admin = caller.identity.is_admin;
    let mut query = query;
    if !admin && query.student_id.is_none() && query.tutor_id.is_none() {
        query.student_id = Some(me);
    }
    if !admin && query.student_id.is_some_and(|s| s != me) && query.tutor_id != Some(me) {
        return Err(ServerError::Forbidden("bookings of another student".into()));
    }
    if !admin && query.tutor_id.is_some_and(|t| t != me) && query.student_id != Some(me) {
        return Err(ServerError::Forbidden("bookings of another tutor".into()));
    }

    let filter = BookingFilter { student_id: query.student_id, slot_id: None, status: query.status };
    let bookings = match query.tutor_id {
        Some(tutor) => state
            .orchestrator
            .list_tutor_bookings(tutor)?
            .into_iter()
            .filter(|b| filter.matches(b))
            .collect(),
        None => state.orchestrator.list_bookings(&filter)?,
    };
    Ok(Json(bookings))
}

async fn accessible(
    state: &BookingState,
    caller: &Authenticated,
    id: BookingId,
) -> ServerResult<(Booking, AvailabilitySlot)> {
    let booking = state.orchestrator.get_booking(id)?;
    let slot = state.orchestrator.get_slot(booking.availability_id)?;
    caller
        .require(Action::AccessBooking { student_id: booking.student_id, tutor_id: slot.tutor_id })
        .await?;
    Ok((booking, slot))
}

pub async fn get_booking(
    State(state): State<BookingState>,
    caller: Authenticated,
    Path(booking_id): Path<BookingId>,
) -> ServerResult<Json<Booking>> {
    let (booking, _) = accessible(&state, &caller, booking_id).await?;
    Ok(Json(booking))
}

pub async fn update_booking(
    State(state): State<BookingState>,
    caller: Authenticated,
    Path(booking_id): Path<BookingId>,
    Json(update): Json<BookingUpdate>,
) -> ServerResult<Json<Booking>> {
    accessible(&state, &caller, booking_id).await?;
    Ok(Json(state.orchestrator.update_booking(booking_id, update).await?))
}

pub async fn cancel_booking(
    State(state): State<BookingState>,
    caller: Authenticated,
    Path(booking_id): Path<BookingId>,
    body: Option<Json<CancelBody>>,
) -> ServerResult<Json<Booking>> {
    let requested = body.and_then(|Json(b)| b.initiator);
    let booking = state.orchestrator.get_booking(booking_id)?;
    let slot = state.orchestrator.get_slot(booking.availability_id)?;
    let party = initiator(&caller.identity, booking.student_id, slot.tutor_id, requested)?;
    Ok(Json(state.orchestrator.cancel_booking(booking_id, party).await?))
}

// -- admin ----------------------------------------------------------------

pub async fn recover(
    State(state): State<BookingState>,
    caller: Authenticated,
) -> ServerResult<Json<RecoveryReport>> {
    caller.require(Action::Recover).await?;
    let report = state.orchestrator.recover().await?;
    if !report.is_clean() {
        warn!(failed = report.failed.len(), "recovery left sagas open");
    }
    Ok(Json(report))
}
