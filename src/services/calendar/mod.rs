pub mod google;
pub mod ics;

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset};

use crate::models::BookingView;

/// An appointment as written to the external calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub summary: String,
    pub description: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl CalendarEvent {
    pub fn for_booking(booking: &BookingView) -> Self {
        let mut description = format!(
            "Client: {}\nTelefon: {}",
            booking.client_name, booking.client_phone
        );
        if let Some(email) = &booking.client_email {
            description.push_str(&format!("\nEmail: {email}"));
        }
        if let Some(notes) = booking.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            description.push_str(&format!("\nNote: {notes}"));
        }
        description.push_str(&format!("\nID programare: {}", booking.id));

        Self {
            summary: format!("{} - {}", booking.service_name, booking.client_name),
            description,
            start: booking.date,
            end: booking.date + Duration::minutes(booking.duration_minutes),
        }
    }
}

/// An occupied interval reported by the calendar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BusyInterval {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Returns the id of the created event.
    async fn create_event(&self, event: &CalendarEvent) -> anyhow::Result<String>;
    async fn update_event(&self, event_id: &str, event: &CalendarEvent) -> anyhow::Result<()>;
    /// Deleting an event that no longer exists succeeds.
    async fn delete_event(&self, event_id: &str) -> anyhow::Result<()>;
    async fn list_events(
        &self,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> anyhow::Result<Vec<BusyInterval>>;
}

/// Installed when no Google credentials are configured.
pub struct UnconfiguredCalendar;

#[async_trait]
impl CalendarProvider for UnconfiguredCalendar {
    async fn create_event(&self, _event: &CalendarEvent) -> anyhow::Result<String> {
        anyhow::bail!("calendar not configured")
    }

    async fn update_event(&self, _event_id: &str, _event: &CalendarEvent) -> anyhow::Result<()> {
        anyhow::bail!("calendar not configured")
    }

    async fn delete_event(&self, _event_id: &str) -> anyhow::Result<()> {
        anyhow::bail!("calendar not configured")
    }

    async fn list_events(
        &self,
        _start: DateTime<FixedOffset>,
        _end: DateTime<FixedOffset>,
    ) -> anyhow::Result<Vec<BusyInterval>> {
        Ok(vec![])
    }
}
