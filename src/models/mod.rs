pub mod availability;
pub mod booking;
pub mod client;
pub mod notification;
pub mod service;

pub use availability::Availability;
pub use booking::{Booking, BookingStatus, BookingView, ModificationProposal, SyncStatus};
pub use client::Client;
pub use notification::{BusEvent, NotificationRecord};
pub use service::{catalog_entry, CatalogEntry, Service, CATALOG};
