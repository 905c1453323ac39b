use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::services::calendar::CalendarProvider;
use crate::services::mail::Mailer;
use crate::services::notifications::{NotificationBus, NotificationFeed};
use crate::services::tokens::TokenSigner;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub calendar: Box<dyn CalendarProvider>,
    pub mailer: Box<dyn Mailer>,
    pub bus: NotificationBus,
    pub feed: NotificationFeed,
    pub signer: TokenSigner,
}

impl AppState {
    pub fn new(
        conn: Connection,
        config: AppConfig,
        calendar: Box<dyn CalendarProvider>,
        mailer: Box<dyn Mailer>,
    ) -> Self {
        let signer = TokenSigner::new(&config.session_secret);
        Self {
            db: Arc::new(Mutex::new(conn)),
            config,
            calendar,
            mailer,
            bus: NotificationBus::new(),
            feed: NotificationFeed::new(),
            signer,
        }
    }

    /// Locks the connection. Never hold the guard across an `.await`.
    pub fn db(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.db
            .lock()
            .map_err(|_| AppError::Store(anyhow::anyhow!("database mutex poisoned")))
    }
}
