use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::errors::AppError;
use crate::services::scheduling::{self, DayAvailability};
use crate::state::AppState;

// GET /availability?date=YYYY-MM-DD&service=
#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub date: Option<String>,
    pub service: Option<String>,
}

pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<DayAvailability>, AppError> {
    let raw = query.date.as_deref().map(str::trim).unwrap_or("");
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(vec!["date must be YYYY-MM-DD".to_string()]))?;
    let service = query.service.as_deref().map(str::trim).filter(|s| !s.is_empty());

    Ok(Json(scheduling::day_availability(&state, date, service).await?))
}
