use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{BookingStatus, SyncStatus};
use crate::services::lifecycle::{remove_from_calendar, sync_to_calendar};
use crate::state::AppState;

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub synced: usize,
    pub failed: usize,
}

/// Retries failed syncs and leftover events of cancelled bookings.
pub async fn run_once(state: &AppState) -> Result<ReconcileReport, AppError> {
    let pending = {
        let db = state.db()?;
        queries::bookings_needing_reconcile(&db)?
    };

    let mut report = ReconcileReport::default();
    for booking in pending {
        let ok = match (booking.status, booking.google_calendar_id.as_deref()) {
            (BookingStatus::Cancelled, Some(event_id)) => {
                remove_from_calendar(state, &booking.id, event_id, SyncStatus::Synced).await?
            }
            (BookingStatus::Confirmed, _) => {
                let view = {
                    let db = state.db()?;
                    queries::get_booking_view(&db, &booking.id)?
                };
                // Deleted since the scan
                let Some(view) = view else { continue };
                sync_to_calendar(state, &view).await? == SyncStatus::Synced
            }
            _ => continue,
        };

        if ok {
            report.synced += 1;
        } else {
            report.failed += 1;
        }
    }

    Ok(report)
}

pub fn spawn(state: Arc<AppState>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match run_once(&state).await {
                Ok(report) if report.synced + report.failed > 0 => {
                    tracing::info!(synced = report.synced, failed = report.failed, "calendar reconcile pass");
                }
                Ok(_) => tracing::debug!("calendar reconcile pass, nothing to do"),
                Err(e) => tracing::error!(error = %e, "calendar reconcile pass failed"),
            }
        }
    })
}
