//! Alert delivery.
//!
//! [`SmtpNotifier`] wraps the `lettre` async SMTP transport and is used when
//! `SMTP_HOST` is configured. Without it the service falls back to
//! [`LogNotifier`], which only records the alert in the log.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{info, warn};

use crate::config::EmailConfig;

// ---

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Email build error: {0}")]
    Build(String),
}

/// Outbound message dispatch.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_alert(
        &self,
        subject: &str,
        body: &str,
        recipients: &[String],
    ) -> Result<(), NotifyError>;
}

// ---

/// Plain-text email over a STARTTLS relay.
pub struct SmtpNotifier {
    // ---
    from: Mailbox,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotifier {
    // ---
    pub fn new(config: &EmailConfig) -> Result<Self, NotifyError> {
        // ---
        let from = config.sender.parse::<Mailbox>()?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            from,
            mailer: builder.build(),
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    // ---
    async fn send_alert(
        &self,
        subject: &str,
        body: &str,
        recipients: &[String],
    ) -> Result<(), NotifyError> {
        // ---
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);
        for addr in recipients {
            builder = builder.to(addr.parse::<Mailbox>()?);
        }

        let email = builder
            .body(body.to_string())
            .map_err(|e| NotifyError::Build(e.to_string()))?;

        self.mailer.send(email).await?;

        info!(to = ?recipients, subject, "Alert email sent");
        Ok(())
    }
}

// ---

/// Fallback used when no SMTP relay is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_alert(
        &self,
        subject: &str,
        body: &str,
        recipients: &[String],
    ) -> Result<(), NotifyError> {
        warn!(to = ?recipients, subject, body, "SMTP not configured, alert only logged");
        Ok(())
    }
}

// ---
