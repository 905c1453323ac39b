use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::auth::check_admin;
use crate::models::{BookingStatus, BookingView};
use crate::services::lifecycle::{self, RescheduleInput, RescheduleResult};
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

// GET /bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<BookingView>>, AppError> {
    check_admin(&state, &headers, None)?;

    let status_filter = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            BookingStatus::parse(raw)
                .ok_or_else(|| AppError::Validation(vec![format!("unknown status: {raw}")]))?,
        ),
        None => None,
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);

    let bookings = {
        let db = state.db()?;
        queries::list_bookings(&db, status_filter, limit)?
    };

    Ok(Json(bookings))
}

// GET /bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingView>, AppError> {
    check_admin(&state, &headers, None)?;

    let db = state.db()?;
    let booking =
        queries::get_booking_view(&db, &id)?.ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;
    Ok(Json(booking))
}

// POST /bookings/:id/approve
pub async fn approve_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingView>, AppError> {
    check_admin(&state, &headers, None)?;
    Ok(Json(lifecycle::approve_booking(&state, &id).await?))
}

// POST /bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingView>, AppError> {
    check_admin(&state, &headers, None)?;
    Ok(Json(lifecycle::cancel_booking(&state, &id).await?))
}

// POST /bookings/:id/reschedule
pub async fn reschedule_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<RescheduleInput>, JsonRejection>,
) -> Result<Json<RescheduleResult>, AppError> {
    check_admin(&state, &headers, None)?;
    let Json(body) = body?;
    Ok(Json(lifecycle::propose_reschedule(&state, &id, body).await?))
}
