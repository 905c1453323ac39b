use anyhow::Context;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MailAttachment, Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{Email, Mailer};

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(
        host: &str,
        port: u16,
        username: String,
        password: String,
        from_email: &str,
        from_name: &str,
    ) -> anyhow::Result<Self> {
        // 465 speaks TLS from the first byte, everything else upgrades with STARTTLS
        let builder = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .context("failed to configure SMTP relay")?;

        let transport = builder
            .port(port)
            .credentials(Credentials::new(username, password))
            .build();

        let from = format!("{from_name} <{from_email}>")
            .parse()
            .context("invalid MAIL_FROM address")?;

        Ok(Self { transport, from })
    }

    fn build_message(&self, email: &Email) -> anyhow::Result<Message> {
        let to: Mailbox = email
            .to
            .parse()
            .with_context(|| format!("invalid recipient address: {}", email.to))?;

        let alternative = MultiPart::alternative_plain_html(email.text.clone(), email.html.clone());
        let body = match &email.attachment {
            Some(attachment) => {
                let content_type = ContentType::parse(&attachment.content_type)
                    .context("invalid attachment content type")?;
                MultiPart::mixed().multipart(alternative).singlepart(
                    MailAttachment::new(attachment.filename.clone())
                        .body(attachment.content.clone(), content_type),
                )
            }
            None => alternative,
        };

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.clone())
            .multipart(body)
            .context("failed to build email")
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        let message = self.build_message(email)?;
        self.transport
            .send(message)
            .await
            .context("SMTP relay rejected email")?;
        Ok(())
    }
}
