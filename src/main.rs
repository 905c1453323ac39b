use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use barbershop::config::AppConfig;
use barbershop::db;
use barbershop::handlers;
use barbershop::services::calendar::google::GoogleCalendar;
use barbershop::services::calendar::{CalendarProvider, UnconfiguredCalendar};
use barbershop::services::mail::smtp::SmtpMailer;
use barbershop::services::mail::{Mailer, UnconfiguredMailer};
use barbershop::services::reconciler;
use barbershop::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;
    tracing::info!(hours = %config.business_hours.to_human_readable(), "business hours");

    let calendar: Box<dyn CalendarProvider> = if config.calendar_configured() {
        tracing::info!(calendar_id = %config.google_calendar_id, "using Google Calendar");
        Box::new(GoogleCalendar::new(
            config.google_calendar_id.clone(),
            config.google_service_account_email.clone(),
            &config.google_private_key,
        )?)
    } else {
        tracing::warn!("Google Calendar not configured, approvals will be recorded as sync failures");
        Box::new(UnconfiguredCalendar)
    };

    let mailer: Box<dyn Mailer> = if config.smtp_configured() {
        tracing::info!(host = %config.smtp_host, port = config.smtp_port, "using SMTP mailer");
        Box::new(SmtpMailer::new(
            &config.smtp_host,
            config.smtp_port,
            config.smtp_username.clone(),
            config.smtp_password.clone(),
            &config.mail_from,
            &config.shop_name,
        )?)
    } else {
        tracing::warn!("SMTP not configured, client emails will not be sent");
        Box::new(UnconfiguredMailer)
    };

    let state = Arc::new(AppState::new(conn, config.clone(), calendar, mailer));

    if config.reconcile_interval_secs > 0 {
        reconciler::spawn(
            state.clone(),
            Duration::from_secs(config.reconcile_interval_secs),
        );
    }

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
