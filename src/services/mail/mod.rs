pub mod smtp;
pub mod templates;

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub attachment: Option<Attachment>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> anyhow::Result<()>;
}

/// Installed when no SMTP relay is configured.
pub struct UnconfiguredMailer;

#[async_trait]
impl Mailer for UnconfiguredMailer {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        tracing::debug!(to = %email.to, subject = %email.subject, "mailer not configured, dropping email");
        anyhow::bail!("mailer not configured")
    }
}
