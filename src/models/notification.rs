use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::BookingView;

/// Lifecycle event pushed to dashboard viewers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusEvent {
    Connected { message: String },
    NewBooking { booking: Box<BookingView> },
    BookingUpdated { booking: Box<BookingView> },
    Keepalive { timestamp: DateTime<Utc> },
}

impl BusEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            BusEvent::Connected { .. } => "connected",
            BusEvent::NewBooking { .. } => "new_booking",
            BusEvent::BookingUpdated { .. } => "booking_updated",
            BusEvent::Keepalive { .. } => "keepalive",
        }
    }

    pub fn booking(&self) -> Option<&BookingView> {
        match self {
            BusEvent::NewBooking { booking } | BusEvent::BookingUpdated { booking } => {
                Some(booking)
            }
            _ => None,
        }
    }
}

/// Entry in the polling fallback buffer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub booking_id: Option<String>,
    pub message: String,
    /// Unix milliseconds.
    pub timestamp: i64,
}
