use std::env;

use sha2::{Digest, Sha256};

use crate::models::Availability;

const DEFAULT_BUSINESS_HOURS: &str = r#"{"slots":[
    {"day":"mon","start":"09:00","end":"19:00"},
    {"day":"tue","start":"09:00","end":"19:00"},
    {"day":"wed","start":"09:00","end":"19:00"},
    {"day":"thu","start":"09:00","end":"19:00"},
    {"day":"fri","start":"09:00","end":"19:00"},
    {"day":"sat","start":"09:00","end":"15:00"}
]}"#;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub public_base_url: String,
    pub shop_name: String,
    pub admin_username: String,
    /// Hex-encoded SHA-256 of the admin password.
    pub admin_password_sha256: String,
    pub session_secret: String,
    pub cron_secret: String,
    pub google_calendar_id: String,
    pub google_service_account_email: String,
    pub google_private_key: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub mail_from: String,
    pub business_hours: Availability,
    pub slot_minutes: i64,
    pub reconcile_interval_secs: u64,
    pub modification_link_ttl_hours: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let admin_password_sha256 = env::var("ADMIN_PASSWORD_SHA256")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim().to_lowercase())
            .unwrap_or_else(|| {
                let plain = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "changeme".to_string());
                hash_password(&plain)
            });

        let business_hours = env::var("BUSINESS_HOURS")
            .ok()
            .and_then(|raw| match Availability::from_json(&raw) {
                Ok(a) => Some(a),
                Err(e) => {
                    tracing::warn!(error = %e, "invalid BUSINESS_HOURS, using defaults");
                    None
                }
            })
            .unwrap_or_else(default_business_hours);

        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "barbershop.db".to_string()),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            shop_name: env::var("SHOP_NAME").unwrap_or_else(|_| "Barbershop".to_string()),
            admin_username: env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string()),
            admin_password_sha256,
            session_secret: env::var("SESSION_SECRET")
                .unwrap_or_else(|_| "dev-session-secret".to_string()),
            cron_secret: env::var("CRON_SECRET").unwrap_or_default(),
            google_calendar_id: env::var("GOOGLE_CALENDAR_ID").unwrap_or_default(),
            google_service_account_email: env::var("GOOGLE_SERVICE_ACCOUNT_EMAIL")
                .unwrap_or_default(),
            // Keys pasted into a single env line carry literal "\n" sequences
            google_private_key: env::var("GOOGLE_PRIVATE_KEY")
                .unwrap_or_default()
                .replace("\\n", "\n"),
            smtp_host: env::var("SMTP_HOST").unwrap_or_default(),
            smtp_port: env::var("SMTP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(587),
            smtp_username: env::var("SMTP_USERNAME").unwrap_or_default(),
            smtp_password: env::var("SMTP_PASSWORD").unwrap_or_default(),
            mail_from: env::var("MAIL_FROM").unwrap_or_default(),
            business_hours,
            slot_minutes: env::var("SLOT_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|m: &i64| *m > 0)
                .unwrap_or(30),
            reconcile_interval_secs: env::var("RECONCILE_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            modification_link_ttl_hours: env::var("MODIFICATION_LINK_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(72),
        }
    }

    pub fn calendar_configured(&self) -> bool {
        !self.google_calendar_id.is_empty()
            && !self.google_service_account_email.is_empty()
            && !self.google_private_key.is_empty()
    }

    pub fn smtp_configured(&self) -> bool {
        !self.smtp_host.is_empty() && !self.mail_from.is_empty()
    }
}

pub fn hash_password(plain: &str) -> String {
    hex::encode(Sha256::digest(plain.as_bytes()))
}

pub fn default_business_hours() -> Availability {
    // The constant is validated by the config tests below
    Availability::from_json(DEFAULT_BUSINESS_HOURS).unwrap_or(Availability { slots: vec![] })
}
