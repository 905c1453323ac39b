use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Appointments are stored with the shop's fixed UTC+3 offset.
pub const SHOP_UTC_OFFSET_SECS: i32 = 3 * 3600;

pub fn shop_offset() -> FixedOffset {
    FixedOffset::east_opt(SHOP_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Combine a `YYYY-MM-DD` date and an `HH:MM` time into a shop-local instant.
pub fn parse_slot(date: &str, time: &str) -> Option<DateTime<FixedOffset>> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M").ok()?;
    shop_offset()
        .from_local_datetime(&date.and_time(time))
        .single()
}

pub fn format_time(dt: &DateTime<FixedOffset>) -> String {
    dt.format("%H:%M").to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub client_id: String,
    pub service_id: String,
    pub date: DateTime<FixedOffset>,
    /// Display copy of `date`'s wall-clock time; written together with `date`.
    pub time: String,
    pub notes: Option<String>,
    pub status: BookingStatus,
    pub google_calendar_id: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn set_schedule(&mut self, date: DateTime<FixedOffset>) {
        self.time = format_time(&date);
        self.date = date;
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    RescheduleProposed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::RescheduleProposed => "reschedule_proposed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "cancelled" => Some(BookingStatus::Cancelled),
            "reschedule_proposed" => Some(BookingStatus::RescheduleProposed),
            _ => None,
        }
    }
}

/// Agreement between a booking and its Google Calendar event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Synced,
    Failed,
    OutOfSync,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
            SyncStatus::OutOfSync => "out_of_sync",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "synced" => SyncStatus::Synced,
            "failed" => SyncStatus::Failed,
            _ => SyncStatus::OutOfSync,
        }
    }
}

/// A booking joined with its client and service, as shown to the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingView {
    pub id: String,
    pub client_id: String,
    pub client_name: String,
    pub client_phone: String,
    pub client_email: Option<String>,
    pub service_id: String,
    pub service_name: String,
    pub duration_minutes: i64,
    pub price: i64,
    pub date: DateTime<FixedOffset>,
    pub time: String,
    pub notes: Option<String>,
    pub status: BookingStatus,
    pub google_calendar_id: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookingView {
    pub fn end(&self) -> DateTime<FixedOffset> {
        self.date + chrono::Duration::minutes(self.duration_minutes)
    }
}

/// An admin-initiated date/time change waiting for the client's answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModificationProposal {
    pub id: String,
    pub booking_id: String,
    pub date: DateTime<FixedOffset>,
    pub time: String,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Status the booking returns to if the proposal is withdrawn.
    pub previous_status: BookingStatus,
}
