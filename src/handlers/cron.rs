use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use crate::config::hash_password;
use crate::errors::AppError;
use crate::services::lifecycle;
use crate::services::tokens::digests_match;
use crate::state::AppState;

/// An unset secret disables the endpoint.
fn check_cron_secret(headers: &HeaderMap, secret: &str) -> Result<(), AppError> {
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    if secret.is_empty() || !digests_match(&hash_password(presented), &hash_password(secret)) {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

// GET /cleanup
pub async fn cleanup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    check_cron_secret(&headers, &state.config.cron_secret)?;

    let deleted = lifecycle::retention_sweep(&state, Utc::now())?;
    Ok(Json(json!({ "deleted": deleted })))
}
