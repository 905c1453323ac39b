pub mod admin;
pub mod auth;
pub mod availability;
pub mod bookings;
pub mod calendar;
pub mod cron;
pub mod health;
pub mod notifications;
pub mod pages;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Every route of the service. The binary and the integration tests mount this.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/services", get(health::list_services))
        .route(
            "/bookings",
            post(bookings::create_booking).get(admin::list_bookings),
        )
        .route("/bookings/:id", get(admin::get_booking))
        .route("/bookings/:id/ics", get(calendar::download_ics))
        .route("/bookings/:id/approve", post(admin::approve_booking))
        .route("/bookings/:id/cancel", post(admin::cancel_booking))
        .route("/bookings/:id/reschedule", post(admin::reschedule_booking))
        .route(
            "/bookings/:id/confirm-modification",
            get(bookings::confirm_modification),
        )
        .route(
            "/bookings/:id/reject-modification",
            get(bookings::reject_modification),
        )
        .route("/availability", get(availability::get_availability))
        .route("/notifications", get(notifications::events_stream))
        .route("/notifications/poll", get(notifications::poll))
        .route("/cleanup", get(cron::cleanup))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route(
            "/booking/modification-confirmed",
            get(pages::modification_confirmed),
        )
        .route(
            "/booking/modification-rejected",
            get(pages::modification_rejected),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
