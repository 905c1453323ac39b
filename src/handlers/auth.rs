use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Duration, Utc};
use serde::Deserialize;

use crate::config::hash_password;
use crate::errors::AppError;
use crate::services::tokens::{digests_match, SessionClaims, SESSION_TTL_HOURS};
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "admin_session";

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Accepts the session from the cookie, a bearer header or, for EventSource
/// clients that cannot set headers, a `token` query parameter.
pub fn check_admin(
    state: &AppState,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<SessionClaims, AppError> {
    let now = Utc::now();
    [cookie_value(headers, SESSION_COOKIE), bearer(headers), query_token]
        .into_iter()
        .flatten()
        .find_map(|token| match state.signer.verify_session(token, now) {
            Ok(claims) if claims.sub == state.config.admin_username => Some(claims),
            Ok(claims) => {
                tracing::debug!(sub = %claims.sub, "session for unknown admin");
                None
            }
            Err(e) => {
                tracing::debug!(error = %e, "rejected admin session");
                None
            }
        })
        .ok_or(AppError::Unauthorized)
}

// POST /auth/login
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(body) = body?;
    let username_ok = body.username == state.config.admin_username;
    let password_ok = digests_match(&hash_password(&body.password), &state.config.admin_password_sha256);
    if !(username_ok && password_ok) {
        tracing::warn!(username = %body.username, "failed admin login");
        return Err(AppError::Unauthorized);
    }

    let now = Utc::now();
    let token = state.signer.issue_session(&body.username, now)?;
    let cookie = format!(
        "{SESSION_COOKIE}={token}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        SESSION_TTL_HOURS * 3600
    );
    tracing::info!(username = %body.username, "admin logged in");

    let mut response = Json(serde_json::json!({
        "token": token,
        "expires_at": now + Duration::hours(SESSION_TTL_HOURS),
    }))
    .into_response();
    response.headers_mut().insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(anyhow::Error::from)?,
    );
    Ok(response)
}

// POST /auth/logout
pub async fn logout() -> Response {
    (
        [(
            header::SET_COOKIE,
            format!("{SESSION_COOKIE}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0"),
        )],
        Json(serde_json::json!({"ok": true})),
    )
        .into_response()
}
