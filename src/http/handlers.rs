use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{Local, NaiveDateTime};

use crate::engine::{view, EngineError, NewReservation, ReservationPatch, StatusChange};
use crate::model::{Reservation, ReservationView, ResourceId};

use super::dto::*;
use super::AppState;

type ApiResult<T> = Result<T, EngineError>;

/// Wall clock used to derive `expired`.
fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn respond(reservation: Reservation) -> Json<ReservationResponse> {
    Json(view(reservation, now()).into())
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn list_reservations(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<ReservationPage>> {
    let Query(params) = params?;
    let (filter, page) = params.into_query()?;
    let page = state.engine.query(&filter, page, now()).await?;
    Ok(Json(page.into()))
}

pub async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ReservationResponse>> {
    let id = parse_id(&id)?;
    let found: ReservationView = state.engine.get_reservation(id, now()).await?;
    Ok(Json(found.into()))
}

pub async fn create_reservation(
    State(state): State<AppState>,
    body: Result<Json<CreateReservationRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;
    let new = NewReservation::try_from(req)?;
    let created = state.engine.create_reservation(new).await?;
    Ok((StatusCode::CREATED, respond(created)))
}

pub async fn update_reservation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<UpdateReservationRequest>, JsonRejection>,
) -> ApiResult<Json<ReservationResponse>> {
    let id = parse_id(&id)?;
    let Json(req) = body?;
    let patch = ReservationPatch::try_from(req)?;
    let updated = state.engine.edit_reservation(id, patch).await?;
    Ok(respond(updated))
}

pub async fn change_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<StatusRequest>, JsonRejection>,
) -> ApiResult<Json<ReservationResponse>> {
    let id = parse_id(&id)?;
    let Json(req) = body?;
    let change = StatusChange::try_from(req)?;
    let updated = state.engine.change_status(id, change).await?;
    Ok(respond(updated))
}

pub async fn pay_reservation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ReservationResponse>> {
    let id = parse_id(&id)?;
    let updated = state.engine.mark_paid(id).await?;
    Ok(respond(updated))
}

pub async fn mark_overdue(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ReservationResponse>> {
    let id = parse_id(&id)?;
    let updated = state.engine.mark_overdue(id).await?;
    Ok(respond(updated))
}

pub async fn delete_reservation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    state.engine.delete_reservation(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn availability(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
    params: Result<Query<AvailabilityParams>, QueryRejection>,
) -> ApiResult<Json<AvailabilityResponse>> {
    let resource_id: ResourceId = resource_id
        .trim()
        .parse()
        .map_err(|_| EngineError::validation(format!("{resource_id:?} is not a resource id")))?;
    let Query(params) = params?;
    let date = params
        .date
        .as_deref()
        .ok_or_else(|| EngineError::validation("date is required"))
        .and_then(|d| parse_date("date", d))?;
    let windows = state.engine.availability(resource_id, date).await?;
    Ok(Json(AvailabilityResponse {
        resource_id,
        date,
        windows: windows
            .into_iter()
            .map(|w| Window {
                start_time: w.start,
                end_time: w.end,
            })
            .collect(),
    }))
}
