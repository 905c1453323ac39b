//! Collaborator doubles and state builders for unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};

use crate::config::AppConfig;
use crate::db::{self, queries};
use crate::models::booking::parse_slot;
use crate::models::{catalog_entry, Booking, BookingStatus, Client, SyncStatus};
use crate::services::calendar::{BusyInterval, CalendarEvent, CalendarProvider};
use crate::services::mail::{Email, Mailer};
use crate::state::AppState;

#[derive(Clone, Default)]
pub struct RecordingCalendar {
    fail: bool,
    created: Arc<Mutex<Vec<CalendarEvent>>>,
    updated: Arc<Mutex<Vec<String>>>,
    deleted: Arc<Mutex<Vec<String>>>,
    busy: Arc<Mutex<Vec<BusyInterval>>>,
}

impl RecordingCalendar {
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn with_busy(busy: Vec<BusyInterval>) -> Self {
        Self { busy: Arc::new(Mutex::new(busy)), ..Self::default() }
    }

    pub fn created(&self) -> Vec<CalendarEvent> {
        self.created.lock().unwrap().clone()
    }

    pub fn updated(&self) -> Vec<String> {
        self.updated.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl CalendarProvider for RecordingCalendar {
    async fn create_event(&self, event: &CalendarEvent) -> anyhow::Result<String> {
        anyhow::ensure!(!self.fail, "calendar unreachable");
        let mut created = self.created.lock().unwrap();
        created.push(event.clone());
        Ok(format!("evt-{}", created.len()))
    }

    async fn update_event(&self, event_id: &str, _event: &CalendarEvent) -> anyhow::Result<()> {
        anyhow::ensure!(!self.fail, "calendar unreachable");
        self.updated.lock().unwrap().push(event_id.to_string());
        Ok(())
    }

    async fn delete_event(&self, event_id: &str) -> anyhow::Result<()> {
        anyhow::ensure!(!self.fail, "calendar unreachable");
        self.deleted.lock().unwrap().push(event_id.to_string());
        Ok(())
    }

    async fn list_events(
        &self,
        _start: DateTime<FixedOffset>,
        _end: DateTime<FixedOffset>,
    ) -> anyhow::Result<Vec<BusyInterval>> {
        anyhow::ensure!(!self.fail, "calendar unreachable");
        Ok(self.busy.lock().unwrap().clone())
    }
}

#[derive(Clone, Default)]
pub struct RecordingMailer {
    fail: bool,
    sent: Arc<Mutex<Vec<Email>>>,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        anyhow::ensure!(!self.fail, "smtp relay refused connection");
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub fn test_state(calendar: Box<dyn CalendarProvider>, mailer: Box<dyn Mailer>) -> AppState {
    let conn = db::init_db(":memory:").unwrap();
    let mut config = AppConfig::from_env();
    config.public_base_url = "http://shop.test".to_string();
    config.session_secret = "unit-test-secret".to_string();
    AppState::new(conn, config, calendar, mailer)
}

/// Inserts a 2030-06-17 10:00 "tundere-clasica" booking for client `0722111222`.
pub fn seed_booking(
    state: &AppState,
    id: &str,
    status: BookingStatus,
    google_calendar_id: Option<&str>,
    sync_status: SyncStatus,
) -> Booking {
    let now = Utc::now();
    let db = state.db().unwrap();
    let client_id = match queries::find_client(&db, "0722111222", None).unwrap() {
        Some(client) => client.id,
        None => {
            let client = Client {
                id: "client-1".to_string(),
                name: "Ion Popescu".to_string(),
                phone: "0722111222".to_string(),
                email: Some("ion@example.com".to_string()),
                created_at: now,
                updated_at: now,
            };
            queries::insert_client(&db, &client).unwrap();
            client.id
        }
    };
    queries::ensure_service(&db, catalog_entry("tundere-clasica").unwrap()).unwrap();

    let booking = Booking {
        id: id.to_string(),
        client_id,
        service_id: "tundere-clasica".to_string(),
        date: parse_slot("2030-06-17", "10:00").unwrap(),
        time: "10:00".to_string(),
        notes: None,
        status,
        google_calendar_id: google_calendar_id.map(|s| s.to_string()),
        last_sync_at: None,
        sync_status,
        created_at: now,
        updated_at: now,
    };
    queries::insert_booking(&db, &booking).unwrap();
    booking
}
