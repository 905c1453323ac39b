use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::models::{Service, CATALOG};
use crate::state::AppState;

// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let database = state
        .db()
        .map(|db| db.query_row("SELECT 1", [], |_| Ok(())).is_ok())
        .unwrap_or(false);

    Json(json!({
        "status": if database { "ok" } else { "degraded" },
        "database": database,
        "calendar_configured": state.config.calendar_configured(),
        "mail_configured": state.config.smtp_configured(),
        "subscribers": state.bus.subscriber_count(),
    }))
}

// GET /services
pub async fn list_services() -> Json<Vec<Service>> {
    Json(CATALOG.iter().map(Service::from).collect())
}
