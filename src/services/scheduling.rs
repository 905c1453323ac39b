use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::booking::{format_time, shop_offset};
use crate::models::{catalog_entry, Availability};
use crate::services::calendar::BusyInterval;
use crate::state::AppState;

pub const DEFAULT_DURATION_MINUTES: i64 = 30;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SlotAvailability {
    pub time: String,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayAvailability {
    pub date: String,
    pub service_id: Option<String>,
    pub duration_minutes: i64,
    /// False when the calendar could not be consulted and only the store was used.
    pub calendar_checked: bool,
    pub slots: Vec<SlotAvailability>,
}

/// Slot grid of one day. A slot is free when it starts after `now`, fits in its
/// opening window, and overlaps none of `busy`.
pub fn compute_slots(
    hours: &Availability,
    date: NaiveDate,
    step_minutes: i64,
    duration_minutes: i64,
    busy: &[BusyInterval],
    now: DateTime<Utc>,
) -> Vec<SlotAvailability> {
    let offset = shop_offset();
    let step = Duration::minutes(step_minutes.max(1));
    let duration = Duration::minutes(duration_minutes);
    let mut slots = vec![];

    for (open, close) in hours.windows_for(date) {
        let (Some(mut start), Some(window_end)) = (
            offset.from_local_datetime(&date.and_time(open)).single(),
            offset.from_local_datetime(&date.and_time(close)).single(),
        ) else {
            continue;
        };

        while start < window_end {
            let end = start + duration;
            let overlaps = busy.iter().any(|b| b.start < end && b.end > start);
            slots.push(SlotAvailability {
                time: format_time(&start),
                available: end <= window_end && start > now && !overlaps,
            });
            start += step;
        }
    }

    slots
}

pub async fn day_availability(
    state: &AppState,
    date: NaiveDate,
    service_id: Option<&str>,
) -> Result<DayAvailability, AppError> {
    let duration_minutes = match service_id {
        Some(id) => {
            catalog_entry(id)
                .ok_or_else(|| AppError::NotFound(format!("service {id}")))?
                .duration_minutes
        }
        None => DEFAULT_DURATION_MINUTES,
    };

    let offset = shop_offset();
    let day_start = offset
        .from_local_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
        .single()
        .ok_or_else(|| AppError::Validation(vec![format!("invalid date: {date}")]))?;
    let day_end = day_start + Duration::days(1);

    let mut busy: Vec<BusyInterval> = {
        let db = state.db()?;
        queries::get_bookings_in_range(&db, &day_start, &day_end)?
            .iter()
            .map(|b| BusyInterval {
                start: b.date,
                end: b.end(),
            })
            .collect()
    };

    let calendar_checked = match state.calendar.list_events(day_start, day_end).await {
        Ok(events) => {
            busy.extend(events);
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, %date, "calendar lookup failed, using store only");
            false
        }
    };

    Ok(DayAvailability {
        date: date.format("%Y-%m-%d").to_string(),
        service_id: service_id.map(|s| s.to_string()),
        duration_minutes,
        calendar_checked,
        slots: compute_slots(
            &state.config.business_hours,
            date,
            state.config.slot_minutes,
            duration_minutes,
            &busy,
            Utc::now(),
        ),
    })
}
