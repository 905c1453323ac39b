use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Redirect;
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::BookingView;
use crate::services::lifecycle::{self, CreateBookingInput};
use crate::state::AppState;

// POST /bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateBookingInput>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingView>), AppError> {
    let Json(body) = body?;
    let booking = lifecycle::create_booking(&state, body).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

#[derive(Deserialize)]
pub struct ModificationLinkQuery {
    pub token: String,
    pub date: Option<String>,
    pub time: Option<String>,
}

// GET /bookings/:id/confirm-modification
pub async fn confirm_modification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ModificationLinkQuery>,
) -> Result<Redirect, AppError> {
    lifecycle::confirm_modification(
        &state,
        &id,
        &query.token,
        query.date.as_deref(),
        query.time.as_deref(),
    )
    .await?;
    Ok(Redirect::to("/booking/modification-confirmed"))
}

// GET /bookings/:id/reject-modification
pub async fn reject_modification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ModificationLinkQuery>,
) -> Result<Redirect, AppError> {
    lifecycle::reject_modification(&state, &id, &query.token).await?;
    Ok(Redirect::to("/booking/modification-rejected"))
}
