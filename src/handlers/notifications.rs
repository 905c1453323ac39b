use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use crate::errors::AppError;
use crate::handlers::auth::check_admin;
use crate::models::{BusEvent, NotificationRecord};
use crate::services::notifications::{DEFAULT_POLL_LIMIT, FEED_CAPACITY};
use crate::state::AppState;

const KEEPALIVE_SECS: u64 = 30;

fn sse_event(event: &BusEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_default();
    Event::default().event(event.kind()).data(data)
}

// GET /notifications (SSE)
#[derive(Deserialize)]
pub struct SseQuery {
    pub token: Option<String>,
}

pub async fn events_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SseQuery>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, AppError> {
    check_admin(&state, &headers, query.token.as_deref())?;

    let subscription = state.bus.subscribe();
    tracing::debug!(subscriber = subscription.id(), "dashboard viewer connected");

    let connected = tokio_stream::once(Ok::<_, Infallible>(sse_event(&BusEvent::Connected {
        message: "Conectat la notificări".to_string(),
    })));

    let live = subscription.map(|event| Ok(sse_event(&event)));

    let period = Duration::from_secs(KEEPALIVE_SECS);
    let keepalive = IntervalStream::new(tokio::time::interval_at(
        tokio::time::Instant::now() + period,
        period,
    ))
    .map(|_| {
        Ok(sse_event(&BusEvent::Keepalive {
            timestamp: Utc::now(),
        }))
    });

    let merged = StreamExt::merge(connected.chain(live), keepalive);

    Ok(Sse::new(merged))
}

// GET /notifications/poll
#[derive(Deserialize)]
pub struct PollQuery {
    pub since: Option<i64>,
    pub limit: Option<usize>,
    pub token: Option<String>,
}

#[derive(Serialize)]
pub struct PollResponse {
    pub notifications: Vec<NotificationRecord>,
    /// Pass back as `since` on the next poll.
    pub next_since: i64,
    pub has_more: bool,
    pub server_time: i64,
}

pub async fn poll(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<PollQuery>,
) -> Result<Json<PollResponse>, AppError> {
    check_admin(&state, &headers, query.token.as_deref())?;

    let since = query.since.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_POLL_LIMIT).clamp(1, FEED_CAPACITY);
    let mut notifications = state.feed.since(since, limit + 1);
    let has_more = notifications.len() > limit;
    notifications.truncate(limit);
    let next_since = notifications.last().map_or(since, |r| r.timestamp);

    Ok(Json(PollResponse {
        notifications,
        next_since,
        has_more,
        server_time: Utc::now().timestamp_millis(),
    }))
}
