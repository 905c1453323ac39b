use std::sync::OnceLock;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::booking::{format_time, parse_slot};
use crate::models::{
    catalog_entry, Booking, BookingStatus, BookingView, BusEvent, Client, ModificationProposal,
    SyncStatus, CATALOG,
};
use crate::services::calendar::CalendarEvent;
use crate::services::mail::{templates, Email};
use crate::services::tokens::ModificationClaims;
use crate::state::AppState;

pub const RETENTION_DAYS: i64 = 30;
const MAX_NOTES_CHARS: usize = 500;

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles")
    })
}

// Missing fields deserialize empty so validation can report all of them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateBookingInput {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    #[serde(alias = "serviceId")]
    pub service_id: String,
    pub date: String,
    pub time: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RescheduleInput {
    pub date: Option<String>,
    pub time: Option<String>,
    pub notes: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RescheduleResult {
    pub booking: BookingView,
    /// Set when the change waits for the client's answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal: Option<ProposalLinks>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProposalLinks {
    pub proposal_id: String,
    pub date: String,
    pub time: String,
    pub expires_at: DateTime<Utc>,
    pub confirm_url: String,
    pub reject_url: String,
    pub email_sent: bool,
}

struct ValidBooking {
    name: String,
    phone: String,
    email: Option<String>,
    service: &'static crate::models::CatalogEntry,
    date: DateTime<FixedOffset>,
    notes: Option<String>,
}

fn clean_optional(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

/// Reports all violations at once; an unknown service alone is `NotFound`.
fn validate_create(input: &CreateBookingInput, now: DateTime<Utc>) -> Result<ValidBooking, AppError> {
    let mut errors = vec![];

    let name = input.name.trim().to_string();
    if name.chars().count() < 2 {
        errors.push("name must be at least 2 characters".to_string());
    }

    let phone = input.phone.trim().to_string();
    if phone.chars().count() < 10 {
        errors.push("phone must be at least 10 characters".to_string());
    }

    let email = clean_optional(input.email.as_deref());
    if let Some(email) = &email {
        if !email_re().is_match(email) {
            errors.push("email must be a valid email address".to_string());
        }
    }

    let notes = clean_optional(input.notes.as_deref());
    if notes.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTES_CHARS) {
        errors.push(format!("notes must be at most {MAX_NOTES_CHARS} characters"));
    }

    let date = parse_slot(&input.date, &input.time);
    match date {
        None => errors.push("date must be YYYY-MM-DD and time HH:MM".to_string()),
        Some(dt) if dt <= now => errors.push("appointment must be in the future".to_string()),
        Some(_) => {}
    }

    let service = catalog_entry(input.service_id.trim());
    if service.is_none() {
        if errors.is_empty() {
            return Err(AppError::NotFound(format!("service {}", input.service_id.trim())));
        }
        let known: Vec<&str> = CATALOG.iter().map(|s| s.id).collect();
        errors.push(format!("service_id must be one of: {}", known.join(", ")));
    }

    match (service, date) {
        (Some(service), Some(date)) if errors.is_empty() => Ok(ValidBooking {
            name,
            phone,
            email,
            service,
            date,
            notes,
        }),
        _ => Err(AppError::Validation(errors)),
    }
}

// ── Side-effect helpers ──

fn load_view(state: &AppState, id: &str) -> Result<BookingView, AppError> {
    let db = state.db()?;
    queries::get_booking_view(&db, id)?.ok_or_else(|| AppError::NotFound(format!("booking {id}")))
}

fn load_booking(state: &AppState, id: &str) -> Result<Booking, AppError> {
    let db = state.db()?;
    queries::get_booking(&db, id)?.ok_or_else(|| AppError::NotFound(format!("booking {id}")))
}

pub(crate) async fn sync_to_calendar(state: &AppState, view: &BookingView) -> Result<SyncStatus, AppError> {
    let event = CalendarEvent::for_booking(view);
    let (calendar_id, sync_status) = match view.google_calendar_id.as_deref() {
        Some(event_id) => match state.calendar.update_event(event_id, &event).await {
            Ok(()) => (Some(event_id.to_string()), SyncStatus::Synced),
            Err(e) => {
                tracing::warn!(booking_id = %view.id, error = %format!("{e:#}"), "calendar update failed");
                (Some(event_id.to_string()), SyncStatus::Failed)
            }
        },
        None => match state.calendar.create_event(&event).await {
            Ok(event_id) => (Some(event_id), SyncStatus::Synced),
            Err(e) => {
                tracing::warn!(booking_id = %view.id, error = %format!("{e:#}"), "calendar create failed");
                (None, SyncStatus::Failed)
            }
        },
    };

    let now = Utc::now();
    let synced_at = (sync_status == SyncStatus::Synced).then_some(now);
    {
        let db = state.db()?;
        queries::record_sync(
            &db,
            &view.id,
            calendar_id.as_deref(),
            sync_status,
            synced_at.as_ref(),
            &now,
        )?;
    }
    Ok(sync_status)
}

pub(crate) async fn remove_from_calendar(
    state: &AppState,
    booking_id: &str,
    event_id: &str,
    sync_after: SyncStatus,
) -> Result<bool, AppError> {
    match state.calendar.delete_event(event_id).await {
        Ok(()) => {
            let now = Utc::now();
            let db = state.db()?;
            queries::record_sync(&db, booking_id, None, sync_after, Some(&now), &now)?;
            Ok(true)
        }
        Err(e) => {
            tracing::warn!(%booking_id, error = %format!("{e:#}"), "calendar delete failed");
            Ok(false)
        }
    }
}

async fn deliver(state: &AppState, email: Option<Email>, booking_id: &str, kind: &str) -> bool {
    let Some(email) = email else {
        tracing::debug!(%booking_id, kind, "client has no email address, skipping");
        return false;
    };
    match state.mailer.send(&email).await {
        Ok(()) => {
            tracing::info!(%booking_id, kind, "email sent");
            true
        }
        Err(e) => {
            tracing::error!(%booking_id, kind, error = %format!("{e:#}"), "email delivery failed");
            false
        }
    }
}

fn publish(state: &AppState, event: BusEvent) {
    let receivers = state.bus.publish(&event);
    state.feed.record(&event, Utc::now());
    tracing::debug!(kind = event.kind(), receivers, "notification published");
}

// ── Operations ──

pub async fn create_booking(
    state: &AppState,
    input: CreateBookingInput,
) -> Result<BookingView, AppError> {
    let now = Utc::now();
    let valid = validate_create(&input, now)?;

    let view = {
        let mut db = state.db()?;
        let tx = db.transaction().map_err(anyhow::Error::from)?;

        let service = queries::ensure_service(&tx, valid.service)?;

        let client_id = match queries::find_client(&tx, &valid.phone, valid.email.as_deref())? {
            Some(existing) => {
                let email = valid.email.clone().or(existing.email.clone());
                if existing.name != valid.name || existing.email != email {
                    queries::update_client_contact(&tx, &existing.id, &valid.name, email.as_deref(), &now)?;
                }
                existing.id
            }
            None => {
                let client = Client {
                    id: uuid::Uuid::new_v4().to_string(),
                    name: valid.name.clone(),
                    phone: valid.phone.clone(),
                    email: valid.email.clone(),
                    created_at: now,
                    updated_at: now,
                };
                queries::insert_client(&tx, &client)?;
                client.id
            }
        };

        let booking = Booking {
            id: uuid::Uuid::new_v4().to_string(),
            client_id,
            service_id: service.id,
            time: format_time(&valid.date),
            date: valid.date,
            notes: valid.notes,
            status: BookingStatus::Pending,
            google_calendar_id: None,
            last_sync_at: None,
            sync_status: SyncStatus::Synced,
            created_at: now,
            updated_at: now,
        };
        queries::insert_booking(&tx, &booking)?;
        let view = queries::get_booking_view(&tx, &booking.id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {}", booking.id)))?;
        tx.commit().map_err(anyhow::Error::from)?;
        view
    };

    tracing::info!(booking_id = %view.id, service = %view.service_id, date = %view.date, "booking created");

    deliver(
        state,
        templates::booking_received(&view, &state.config.shop_name),
        &view.id,
        "booking_received",
    )
    .await;
    publish(state, BusEvent::NewBooking { booking: Box::new(view.clone()) });

    Ok(view)
}

pub async fn approve_booking(state: &AppState, id: &str) -> Result<BookingView, AppError> {
    let booking = load_booking(state, id)?;
    if booking.status != BookingStatus::Pending {
        return Err(AppError::InvalidState(format!(
            "booking is {}, only pending bookings can be approved",
            booking.status.as_str()
        )));
    }

    {
        let db = state.db()?;
        if !queries::confirm_if_pending(&db, id, &Utc::now())? {
            return Err(AppError::InvalidState(
                "booking changed while approving, only pending bookings can be approved".to_string(),
            ));
        }
    }
    tracing::info!(booking_id = %id, "booking approved");

    let view = load_view(state, id)?;
    sync_to_calendar(state, &view).await?;
    let view = load_view(state, id)?;

    deliver(
        state,
        templates::booking_confirmed(&view, &state.config.shop_name),
        id,
        "booking_confirmed",
    )
    .await;
    publish(state, BusEvent::BookingUpdated { booking: Box::new(view.clone()) });

    Ok(view)
}

pub async fn cancel_booking(state: &AppState, id: &str) -> Result<BookingView, AppError> {
    let booking = load_booking(state, id)?;
    if booking.status == BookingStatus::Cancelled {
        return Err(AppError::InvalidState("booking is already cancelled".to_string()));
    }

    {
        let db = state.db()?;
        let now = Utc::now();
        if !queries::cancel_if_active(&db, id, &now)? {
            return Err(AppError::InvalidState("booking is already cancelled".to_string()));
        }
        queries::close_open_proposals(&db, id, &now)?;
    }
    tracing::info!(booking_id = %id, "booking cancelled");

    if let Some(event_id) = booking.google_calendar_id.as_deref() {
        remove_from_calendar(state, id, event_id, SyncStatus::OutOfSync).await?;
    }

    let view = load_view(state, id)?;
    deliver(
        state,
        templates::booking_cancelled(&view, &state.config.shop_name),
        id,
        "booking_cancelled",
    )
    .await;
    publish(state, BusEvent::BookingUpdated { booking: Box::new(view.clone()) });

    Ok(view)
}

/// A new slot without a forced status becomes a client proposal.
pub async fn propose_reschedule(
    state: &AppState,
    id: &str,
    input: RescheduleInput,
) -> Result<RescheduleResult, AppError> {
    let mut booking = load_booking(state, id)?;
    let now = Utc::now();
    let mut errors = vec![];

    let forced_status = match clean_optional(input.status.as_deref()) {
        None => None,
        Some(raw) => match BookingStatus::parse(&raw) {
            Some(BookingStatus::RescheduleProposed) => {
                errors.push("status cannot be set to reschedule_proposed directly".to_string());
                None
            }
            Some(status) => Some(status),
            None => {
                errors.push(format!("unknown status: {raw}"));
                None
            }
        },
    };

    let new_date = if input.date.is_some() || input.time.is_some() {
        let date = clean_optional(input.date.as_deref())
            .unwrap_or_else(|| booking.date.format("%Y-%m-%d").to_string());
        let time = clean_optional(input.time.as_deref()).unwrap_or_else(|| booking.time.clone());
        match parse_slot(&date, &time) {
            None => {
                errors.push("date must be YYYY-MM-DD and time HH:MM".to_string());
                None
            }
            Some(dt) if dt <= now => {
                errors.push("appointment must be in the future".to_string());
                None
            }
            Some(dt) => Some(dt),
        }
    } else {
        None
    };

    let new_notes = input.notes.as_deref().map(|n| clean_optional(Some(n)));
    if let Some(Some(notes)) = &new_notes {
        if notes.chars().count() > MAX_NOTES_CHARS {
            errors.push(format!("notes must be at most {MAX_NOTES_CHARS} characters"));
        }
    }

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let schedule_changed = new_date.is_some_and(|d| d != booking.date);

    if schedule_changed && forced_status.is_none() {
        let proposed = new_date.unwrap_or(booking.date);
        return propose(state, booking, proposed, new_notes).await;
    }

    if forced_status == Some(BookingStatus::Cancelled) {
        if let Some(notes) = new_notes {
            booking.notes = notes;
            booking.updated_at = now;
            let db = state.db()?;
            queries::save_booking(&db, &booking)?;
        }
        let view = cancel_booking(state, id).await?;
        return Ok(RescheduleResult { booking: view, proposal: None });
    }

    // Re-submitting the current schedule withdraws an open proposal
    let withdrawn = if booking.status == BookingStatus::RescheduleProposed
        && forced_status.is_none()
        && new_date.is_some()
    {
        let db = state.db()?;
        let restored = queries::open_proposal(&db, id)?
            .map_or(BookingStatus::Confirmed, |p| p.previous_status);
        booking.status = restored;
        true
    } else {
        false
    };

    let previous_status = booking.status;
    let notes_changed = new_notes.as_ref().is_some_and(|n| *n != booking.notes);
    if let Some(date) = new_date {
        booking.set_schedule(date);
    }
    if let Some(notes) = new_notes {
        booking.notes = notes;
    }
    if let Some(status) = forced_status {
        booking.status = status;
    }
    if booking.status != BookingStatus::Confirmed && booking.google_calendar_id.is_some() {
        booking.sync_status = SyncStatus::OutOfSync;
    }
    booking.updated_at = now;

    {
        let db = state.db()?;
        queries::save_booking(&db, &booking)?;
        if forced_status.is_some() || schedule_changed || withdrawn {
            queries::close_open_proposals(&db, id, &now)?;
        }
    }
    tracing::info!(
        booking_id = %id,
        status = booking.status.as_str(),
        schedule_changed,
        withdrawn,
        "booking updated by admin"
    );

    let became_confirmed =
        booking.status == BookingStatus::Confirmed && previous_status != BookingStatus::Confirmed;
    if booking.status == BookingStatus::Confirmed && (schedule_changed || became_confirmed || notes_changed) {
        let view = load_view(state, id)?;
        sync_to_calendar(state, &view).await?;
    }

    let view = load_view(state, id)?;
    if booking.status == BookingStatus::Confirmed && (schedule_changed || became_confirmed) {
        deliver(
            state,
            templates::booking_confirmed(&view, &state.config.shop_name),
            id,
            "booking_confirmed",
        )
        .await;
    }
    publish(state, BusEvent::BookingUpdated { booking: Box::new(view.clone()) });

    Ok(RescheduleResult { booking: view, proposal: None })
}

async fn propose(
    state: &AppState,
    mut booking: Booking,
    proposed: DateTime<FixedOffset>,
    new_notes: Option<Option<String>>,
) -> Result<RescheduleResult, AppError> {
    if !matches!(
        booking.status,
        BookingStatus::Pending | BookingStatus::Confirmed | BookingStatus::RescheduleProposed
    ) {
        return Err(AppError::InvalidState(format!(
            "booking is {}, it cannot be rescheduled",
            booking.status.as_str()
        )));
    }

    let previous_status = match booking.status {
        BookingStatus::RescheduleProposed => {
            let db = state.db()?;
            queries::open_proposal(&db, &booking.id)?
                .map_or(BookingStatus::Confirmed, |p| p.previous_status)
        }
        status => status,
    };

    let now = Utc::now();
    let proposal = ModificationProposal {
        id: uuid::Uuid::new_v4().to_string(),
        booking_id: booking.id.clone(),
        time: format_time(&proposed),
        date: proposed,
        expires_at: now + Duration::hours(state.config.modification_link_ttl_hours),
        consumed_at: None,
        created_at: now,
        previous_status,
    };
    let claims = ModificationClaims {
        booking_id: booking.id.clone(),
        proposal_id: proposal.id.clone(),
        date: proposed.format("%Y-%m-%d").to_string(),
        time: proposal.time.clone(),
        exp: proposal.expires_at.timestamp(),
    };
    let token = state.signer.issue_modification(&claims)?;
    let base = &state.config.public_base_url;
    let confirm_url = format!(
        "{base}/bookings/{}/confirm-modification?token={token}&date={}&time={}",
        booking.id, claims.date, claims.time
    );
    let reject_url = format!("{base}/bookings/{}/reject-modification?token={token}", booking.id);

    // The client hears about the proposal before the store records it
    let current = load_view(state, &booking.id)?;
    let email_sent = deliver(
        state,
        templates::modification_proposal(
            &current,
            &state.config.shop_name,
            &proposed,
            &proposal.time,
            &confirm_url,
            &reject_url,
        ),
        &booking.id,
        "modification_proposal",
    )
    .await;

    if let Some(notes) = new_notes {
        booking.notes = notes;
    }
    booking.status = BookingStatus::RescheduleProposed;
    booking.updated_at = now;

    {
        let mut db = state.db()?;
        let tx = db.transaction().map_err(anyhow::Error::from)?;
        queries::close_open_proposals(&tx, &booking.id, &now)?;
        queries::insert_proposal(&tx, &proposal)?;
        queries::save_booking(&tx, &booking)?;
        tx.commit().map_err(anyhow::Error::from)?;
    }
    tracing::info!(booking_id = %booking.id, proposal_id = %proposal.id, email_sent, "reschedule proposed");

    let view = load_view(state, &booking.id)?;
    publish(state, BusEvent::BookingUpdated { booking: Box::new(view.clone()) });

    Ok(RescheduleResult {
        booking: view,
        proposal: Some(ProposalLinks {
            proposal_id: proposal.id,
            date: claims.date,
            time: claims.time,
            expires_at: proposal.expires_at,
            confirm_url,
            reject_url,
            email_sent,
        }),
    })
}

/// Checks a confirm/reject link and returns the open proposal it names.
fn verify_link(
    state: &AppState,
    id: &str,
    token: &str,
    date: Option<&str>,
    time: Option<&str>,
) -> Result<ModificationProposal, AppError> {
    let claims = state
        .signer
        .verify_modification(token, Utc::now())
        .map_err(|e| AppError::Forbidden(format!("invalid modification link: {e}")))?;

    if claims.booking_id != id {
        return Err(AppError::Forbidden("link does not belong to this booking".to_string()));
    }
    if date.is_some_and(|d| d != claims.date) || time.is_some_and(|t| t != claims.time) {
        return Err(AppError::Forbidden("link parameters were altered".to_string()));
    }

    let db = state.db()?;
    if queries::get_booking(&db, id)?.is_none() {
        return Err(AppError::NotFound(format!("booking {id}")));
    }
    let proposal = queries::get_proposal(&db, &claims.proposal_id)?
        .ok_or_else(|| AppError::NotFound(format!("proposal {}", claims.proposal_id)))?;
    if proposal.consumed_at.is_some() {
        return Err(AppError::InvalidState("this link was already used or replaced".to_string()));
    }
    Ok(proposal)
}

pub async fn confirm_modification(
    state: &AppState,
    id: &str,
    token: &str,
    date: Option<&str>,
    time: Option<&str>,
) -> Result<BookingView, AppError> {
    let proposal = verify_link(state, id, token, date, time)?;

    {
        let now = Utc::now();
        let db = state.db()?;
        if !queries::consume_proposal(&db, &proposal.id, &now)? {
            return Err(AppError::InvalidState("this link was already used or replaced".to_string()));
        }
        let mut booking = queries::get_booking(&db, id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;
        booking.set_schedule(proposal.date);
        booking.status = BookingStatus::Confirmed;
        booking.updated_at = now;
        queries::save_booking(&db, &booking)?;
    }
    tracing::info!(booking_id = %id, proposal_id = %proposal.id, "client accepted modification");

    let view = load_view(state, id)?;
    sync_to_calendar(state, &view).await?;
    let view = load_view(state, id)?;

    deliver(
        state,
        templates::booking_confirmed(&view, &state.config.shop_name),
        id,
        "booking_confirmed",
    )
    .await;
    publish(state, BusEvent::BookingUpdated { booking: Box::new(view.clone()) });

    Ok(view)
}

pub async fn reject_modification(state: &AppState, id: &str, token: &str) -> Result<(), AppError> {
    verify_link(state, id, token, None, None)?;
    let booking = load_booking(state, id)?;

    if let Some(event_id) = booking.google_calendar_id.as_deref() {
        if let Err(e) = state.calendar.delete_event(event_id).await {
            tracing::warn!(booking_id = %id, error = %format!("{e:#}"), "calendar delete failed");
        }
    }

    let deleted = {
        let db = state.db()?;
        queries::delete_booking(&db, id)?
    };
    if !deleted {
        return Err(AppError::NotFound(format!("booking {id}")));
    }
    tracing::info!(booking_id = %id, "client rejected modification, booking deleted");

    Ok(())
}

/// Deletes cancelled bookings untouched for more than [`RETENTION_DAYS`].
pub fn retention_sweep(state: &AppState, now: DateTime<Utc>) -> Result<usize, AppError> {
    let cutoff = now - Duration::days(RETENTION_DAYS);
    let deleted = {
        let db = state.db()?;
        queries::delete_cancelled_before(&db, &cutoff)?
    };
    tracing::info!(deleted, cutoff = %cutoff, "retention sweep finished");
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{seed_booking, test_state, RecordingCalendar, RecordingMailer};

    fn input(name: &str, phone: &str, email: Option<&str>, service: &str, date: &str) -> CreateBookingInput {
        CreateBookingInput {
            name: name.to_string(),
            phone: phone.to_string(),
            email: email.map(|e| e.to_string()),
            service_id: service.to_string(),
            date: date.to_string(),
            time: "10:00".to_string(),
            notes: None,
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn violations(result: Result<ValidBooking, AppError>) -> Vec<String> {
        match result {
            Err(AppError::Validation(errors)) => errors,
            Err(other) => panic!("expected validation error, got {other:?}"),
            Ok(_) => panic!("expected validation error"),
        }
    }

    #[test]
    fn test_valid_input() {
        let valid = validate_create(
            &input(" Ion Popescu ", "0722111222", Some("ion@example.com"), "tundere-clasica", "2030-06-17"),
            now(),
        )
        .unwrap();
        assert_eq!(valid.name, "Ion Popescu");
        assert_eq!(valid.service.id, "tundere-clasica");
        assert_eq!(valid.date.to_rfc3339(), "2030-06-17T10:00:00+03:00");
    }

    #[test]
    fn test_reports_every_violation() {
        let errors = violations(validate_create(
            &input("I", "123", Some("not-an-email"), "permanent", "2020-01-01"),
            now(),
        ));
        assert_eq!(errors.len(), 5);
        assert!(errors.iter().any(|e| e.contains("name")));
        assert!(errors.iter().any(|e| e.contains("phone")));
        assert!(errors.iter().any(|e| e.contains("email")));
        assert!(errors.iter().any(|e| e.contains("future")));
        assert!(errors.iter().any(|e| e.contains("service_id")));
    }

    #[test]
    fn test_short_phone_only() {
        let errors = violations(validate_create(
            &input("Ion Popescu", "123", None, "tundere-clasica", "2030-06-17"),
            now(),
        ));
        assert_eq!(errors, vec!["phone must be at least 10 characters".to_string()]);
    }

    #[test]
    fn test_unknown_service_alone_is_not_found() {
        let result = validate_create(&input("Ion Popescu", "0722111222", None, "permanent", "2030-06-17"), now());
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_empty_email_is_absent() {
        let valid = validate_create(
            &input("Ion Popescu", "0722111222", Some("  "), "tundere-clasica", "2030-06-17"),
            now(),
        )
        .unwrap();
        assert!(valid.email.is_none());
    }

    #[test]
    fn test_instant_equal_to_now_is_not_future() {
        let at = parse_slot("2030-06-17", "10:00").unwrap().with_timezone(&Utc);
        let errors = violations(validate_create(
            &input("Ion Popescu", "0722111222", None, "tundere-clasica", "2030-06-17"),
            at,
        ));
        assert_eq!(errors, vec!["appointment must be in the future".to_string()]);
    }

    fn token_of(url: &str) -> &str {
        url.split("token=").nth(1).unwrap().split('&').next().unwrap()
    }

    #[tokio::test]
    async fn test_create_stores_pending_and_notifies() {
        let calendar = RecordingCalendar::default();
        let mailer = RecordingMailer::default();
        let state = test_state(Box::new(calendar.clone()), Box::new(mailer.clone()));
        let mut sub = state.bus.subscribe();

        let view = create_booking(
            &state,
            input("Ion Popescu", "0722111222", Some("ion@example.com"), "tundere-clasica", "2030-06-17"),
        )
        .await
        .unwrap();

        assert_eq!(view.status, BookingStatus::Pending);
        assert_eq!(view.client_name, "Ion Popescu");
        assert_eq!(view.duration_minutes, 30);
        assert!(calendar.created().is_empty());
        assert_eq!(mailer.sent().len(), 1);

        let event = sub.try_recv().unwrap();
        assert_eq!(event.kind(), "new_booking");
        assert_eq!(event.booking().unwrap().id, view.id);
        assert_eq!(state.feed.len(), 1);
    }

    #[tokio::test]
    async fn test_returning_client_is_reused() {
        let state = test_state(Box::new(RecordingCalendar::default()), Box::new(RecordingMailer::default()));
        let first = create_booking(&state, input("Ion Popescu", "0722111222", None, "tundere-clasica", "2030-06-17"))
            .await
            .unwrap();
        let second = create_booking(
            &state,
            input("Ion P.", "0722111222", Some("ion@example.com"), "aranjare-barba", "2030-06-18"),
        )
        .await
        .unwrap();

        assert_eq!(first.client_id, second.client_id);
        assert_eq!(second.client_name, "Ion P.");
        assert_eq!(second.client_email.as_deref(), Some("ion@example.com"));
    }

    #[tokio::test]
    async fn test_mail_failure_does_not_fail_create() {
        let state = test_state(Box::new(RecordingCalendar::default()), Box::new(RecordingMailer::failing()));
        let view = create_booking(
            &state,
            input("Ion Popescu", "0722111222", Some("ion@example.com"), "tundere-clasica", "2030-06-17"),
        )
        .await
        .unwrap();
        assert_eq!(view.status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn test_approve_creates_event_and_emails() {
        let calendar = RecordingCalendar::default();
        let mailer = RecordingMailer::default();
        let state = test_state(Box::new(calendar.clone()), Box::new(mailer.clone()));
        seed_booking(&state, "bk-1", BookingStatus::Pending, None, SyncStatus::Synced);
        let mut sub = state.bus.subscribe();

        let view = approve_booking(&state, "bk-1").await.unwrap();

        assert_eq!(view.status, BookingStatus::Confirmed);
        assert_eq!(view.sync_status, SyncStatus::Synced);
        assert_eq!(view.google_calendar_id.as_deref(), Some("evt-1"));
        assert!(view.last_sync_at.is_some());
        assert_eq!(calendar.created().len(), 1);

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].attachment.is_some());

        let event = sub.try_recv().unwrap();
        assert_eq!(event.kind(), "booking_updated");
        assert_eq!(event.booking().unwrap().status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_approve_with_calendar_down_records_failure() {
        let state = test_state(Box::new(RecordingCalendar::failing()), Box::new(RecordingMailer::default()));
        seed_booking(&state, "bk-1", BookingStatus::Pending, None, SyncStatus::Synced);

        let view = approve_booking(&state, "bk-1").await.unwrap();
        assert_eq!(view.status, BookingStatus::Confirmed);
        assert_eq!(view.sync_status, SyncStatus::Failed);
        assert_eq!(view.google_calendar_id, None);
    }

    #[tokio::test]
    async fn test_approve_requires_pending() {
        let state = test_state(Box::new(RecordingCalendar::default()), Box::new(RecordingMailer::default()));
        let before = seed_booking(&state, "bk-1", BookingStatus::Confirmed, None, SyncStatus::Failed);

        let err = approve_booking(&state, "bk-1").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert!(matches!(approve_booking(&state, "missing").await, Err(AppError::NotFound(_))));

        let after = queries::get_booking(&state.db().unwrap(), "bk-1").unwrap().unwrap();
        assert_eq!(after.status, BookingStatus::Confirmed);
        assert_eq!(after.sync_status, SyncStatus::Failed);
        assert_eq!(after.google_calendar_id, None);
        assert_eq!(after.updated_at.timestamp_millis(), before.updated_at.timestamp_millis());
    }

    #[tokio::test]
    async fn test_resubmitting_current_slot_withdraws_proposal() {
        let mailer = RecordingMailer::default();
        let state = test_state(Box::new(RecordingCalendar::default()), Box::new(mailer.clone()));
        seed_booking(&state, "bk-1", BookingStatus::Pending, None, SyncStatus::Synced);

        let proposed = propose_reschedule(
            &state,
            "bk-1",
            RescheduleInput { time: Some("14:00".to_string()), ..Default::default() },
        )
        .await
        .unwrap();
        let token = token_of(&proposed.proposal.unwrap().confirm_url).to_string();

        // Notes alone leave the proposal open
        let noted = propose_reschedule(
            &state,
            "bk-1",
            RescheduleInput { notes: Some("fără grabă".to_string()), ..Default::default() },
        )
        .await
        .unwrap();
        assert_eq!(noted.booking.status, BookingStatus::RescheduleProposed);

        let back = propose_reschedule(
            &state,
            "bk-1",
            RescheduleInput {
                date: Some("2030-06-17".to_string()),
                time: Some("10:00".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(back.proposal.is_none());
        assert_eq!(back.booking.status, BookingStatus::Pending);
        assert_eq!(back.booking.time, "10:00");
        assert!(queries::open_proposal(&state.db().unwrap(), "bk-1").unwrap().is_none());

        let stale = confirm_modification(&state, "bk-1", &token, None, None).await.unwrap_err();
        assert!(matches!(stale, AppError::InvalidState(_)));
        // Only the proposal email went out
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_superseding_proposal_keeps_original_status() {
        let state = test_state(Box::new(RecordingCalendar::default()), Box::new(RecordingMailer::default()));
        seed_booking(&state, "bk-1", BookingStatus::Confirmed, None, SyncStatus::Failed);

        let propose_at = |time: &str| RescheduleInput { time: Some(time.to_string()), ..Default::default() };
        propose_reschedule(&state, "bk-1", propose_at("11:00")).await.unwrap();
        propose_reschedule(&state, "bk-1", propose_at("12:00")).await.unwrap();

        let open = queries::open_proposal(&state.db().unwrap(), "bk-1").unwrap().unwrap();
        assert_eq!(open.time, "12:00");
        assert_eq!(open.previous_status, BookingStatus::Confirmed);

        let back = propose_reschedule(&state, "bk-1", propose_at("10:00")).await.unwrap();
        assert_eq!(back.booking.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_cancel_with_calendar_down_keeps_event_id() {
        let state = test_state(Box::new(RecordingCalendar::failing()), Box::new(RecordingMailer::default()));
        seed_booking(&state, "bk-1", BookingStatus::Confirmed, Some("evt-9"), SyncStatus::Synced);

        let view = cancel_booking(&state, "bk-1").await.unwrap();
        assert_eq!(view.status, BookingStatus::Cancelled);
        assert_eq!(view.sync_status, SyncStatus::OutOfSync);
        assert_eq!(view.google_calendar_id.as_deref(), Some("evt-9"));

        let again = cancel_booking(&state, "bk-1").await.unwrap_err();
        assert!(matches!(again, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_cancel_removes_event() {
        let calendar = RecordingCalendar::default();
        let state = test_state(Box::new(calendar.clone()), Box::new(RecordingMailer::default()));
        seed_booking(&state, "bk-1", BookingStatus::Confirmed, Some("evt-9"), SyncStatus::Synced);

        let view = cancel_booking(&state, "bk-1").await.unwrap();
        assert_eq!(view.google_calendar_id, None);
        assert_eq!(view.sync_status, SyncStatus::OutOfSync);
        assert_eq!(calendar.deleted(), vec!["evt-9".to_string()]);
    }

    #[tokio::test]
    async fn test_proposal_then_confirm() {
        let calendar = RecordingCalendar::default();
        let mailer = RecordingMailer::default();
        let state = test_state(Box::new(calendar.clone()), Box::new(mailer.clone()));
        seed_booking(&state, "bk-1", BookingStatus::Confirmed, Some("evt-1"), SyncStatus::Synced);

        let result = propose_reschedule(
            &state,
            "bk-1",
            RescheduleInput {
                date: Some("2030-06-18".to_string()),
                time: Some("12:30".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(result.booking.status, BookingStatus::RescheduleProposed);
        assert_eq!(result.booking.time, "10:00");
        let links = result.proposal.unwrap();
        assert!(links.email_sent);
        assert!(links.confirm_url.starts_with("http://shop.test/bookings/bk-1/confirm-modification?token="));
        assert!(mailer.sent()[0].text.contains(&links.reject_url));

        let token = token_of(&links.confirm_url).to_string();
        let view = confirm_modification(&state, "bk-1", &token, Some("2030-06-18"), Some("12:30"))
            .await
            .unwrap();
        assert_eq!(view.status, BookingStatus::Confirmed);
        assert_eq!(view.time, "12:30");
        assert_eq!(view.date.to_rfc3339(), "2030-06-18T12:30:00+03:00");
        assert_eq!(view.sync_status, SyncStatus::Synced);
        assert_eq!(calendar.updated(), vec!["evt-1".to_string()]);

        let reused = confirm_modification(&state, "bk-1", &token, None, None).await.unwrap_err();
        assert!(matches!(reused, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_newer_proposal_supersedes_older_link() {
        let state = test_state(Box::new(RecordingCalendar::default()), Box::new(RecordingMailer::default()));
        seed_booking(&state, "bk-1", BookingStatus::Pending, None, SyncStatus::Synced);

        let propose_at = |time: &str| RescheduleInput {
            date: Some("2030-06-18".to_string()),
            time: Some(time.to_string()),
            ..Default::default()
        };
        let first = propose_reschedule(&state, "bk-1", propose_at("11:00")).await.unwrap();
        let second = propose_reschedule(&state, "bk-1", propose_at("15:00")).await.unwrap();

        let stale = token_of(&first.proposal.unwrap().confirm_url).to_string();
        let err = confirm_modification(&state, "bk-1", &stale, None, None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let fresh = token_of(&second.proposal.unwrap().confirm_url).to_string();
        let view = confirm_modification(&state, "bk-1", &fresh, None, None).await.unwrap();
        assert_eq!(view.time, "15:00");
    }

    #[tokio::test]
    async fn test_altered_link_is_forbidden() {
        let state = test_state(Box::new(RecordingCalendar::default()), Box::new(RecordingMailer::default()));
        seed_booking(&state, "bk-1", BookingStatus::Pending, None, SyncStatus::Synced);
        seed_booking(&state, "bk-2", BookingStatus::Pending, None, SyncStatus::Synced);

        let result = propose_reschedule(
            &state,
            "bk-1",
            RescheduleInput { time: Some("16:00".to_string()), ..Default::default() },
        )
        .await
        .unwrap();
        let token = token_of(&result.proposal.unwrap().confirm_url).to_string();

        let wrong_time = confirm_modification(&state, "bk-1", &token, None, Some("17:00")).await;
        assert!(matches!(wrong_time, Err(AppError::Forbidden(_))));
        let other_booking = confirm_modification(&state, "bk-2", &token, None, None).await;
        assert!(matches!(other_booking, Err(AppError::Forbidden(_))));
        let garbage = reject_modification(&state, "bk-1", "abc.def").await;
        assert!(matches!(garbage, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_reject_deletes_booking() {
        let calendar = RecordingCalendar::default();
        let state = test_state(Box::new(calendar.clone()), Box::new(RecordingMailer::default()));
        seed_booking(&state, "bk-1", BookingStatus::Confirmed, Some("evt-3"), SyncStatus::Synced);

        let result = propose_reschedule(
            &state,
            "bk-1",
            RescheduleInput { date: Some("2030-06-19".to_string()), ..Default::default() },
        )
        .await
        .unwrap();
        let token = token_of(&result.proposal.unwrap().reject_url).to_string();

        reject_modification(&state, "bk-1", &token).await.unwrap();
        assert_eq!(calendar.deleted(), vec!["evt-3".to_string()]);
        assert!(queries::get_booking(&state.db().unwrap(), "bk-1").unwrap().is_none());

        let again = reject_modification(&state, "bk-1", &token).await;
        assert!(matches!(again, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_forced_confirm_applies_directly() {
        let calendar = RecordingCalendar::default();
        let state = test_state(Box::new(calendar.clone()), Box::new(RecordingMailer::default()));
        seed_booking(&state, "bk-1", BookingStatus::Pending, None, SyncStatus::Synced);

        let result = propose_reschedule(
            &state,
            "bk-1",
            RescheduleInput {
                date: Some("2030-06-20".to_string()),
                time: Some("09:30".to_string()),
                status: Some("confirmed".to_string()),
                notes: Some("doar maşina".to_string()),
            },
        )
        .await
        .unwrap();

        assert!(result.proposal.is_none());
        assert_eq!(result.booking.status, BookingStatus::Confirmed);
        assert_eq!(result.booking.time, "09:30");
        assert_eq!(result.booking.notes.as_deref(), Some("doar maşina"));
        assert_eq!(result.booking.sync_status, SyncStatus::Synced);
        assert_eq!(calendar.created().len(), 1);
    }

    #[tokio::test]
    async fn test_forced_status_rules() {
        let state = test_state(Box::new(RecordingCalendar::default()), Box::new(RecordingMailer::default()));
        seed_booking(&state, "bk-1", BookingStatus::Pending, None, SyncStatus::Synced);

        let proposed = propose_reschedule(
            &state,
            "bk-1",
            RescheduleInput { status: Some("reschedule_proposed".to_string()), ..Default::default() },
        )
        .await;
        assert!(matches!(proposed, Err(AppError::Validation(_))));

        let cancelled = propose_reschedule(
            &state,
            "bk-1",
            RescheduleInput { status: Some("cancelled".to_string()), ..Default::default() },
        )
        .await
        .unwrap();
        assert_eq!(cancelled.booking.status, BookingStatus::Cancelled);

        let late = propose_reschedule(
            &state,
            "bk-1",
            RescheduleInput { date: Some("2030-07-01".to_string()), ..Default::default() },
        )
        .await;
        assert!(matches!(late, Err(AppError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_retention_sweep_uses_cutoff() {
        let state = test_state(Box::new(RecordingCalendar::default()), Box::new(RecordingMailer::default()));
        seed_booking(&state, "bk-old", BookingStatus::Cancelled, None, SyncStatus::Synced);
        seed_booking(&state, "bk-live", BookingStatus::Pending, None, SyncStatus::Synced);

        assert_eq!(retention_sweep(&state, Utc::now() + Duration::days(29)).unwrap(), 0);
        assert_eq!(retention_sweep(&state, Utc::now() + Duration::days(31)).unwrap(), 1);

        let db = state.db().unwrap();
        assert!(queries::get_booking(&db, "bk-old").unwrap().is_none());
        assert!(queries::get_booking(&db, "bk-live").unwrap().is_some());
    }
}
