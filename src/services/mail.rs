//! Outbound mail
//!
//! Ticket replies are delivered through a [`Mailer`]. Production uses SMTP
//! (Mandrill by default); without credentials mail is only logged.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::{Arc, Mutex};

use crate::config::MailConfig;

/// A plain-text message ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Something that can deliver mail
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<()>;
}

pub type DynMailer = Arc<dyn Mailer>;

/// Pick the mailer for this configuration: SMTP when credentials are present,
/// logging otherwise.
pub fn build_mailer(config: &MailConfig) -> Result<DynMailer> {
    if config.has_credentials() {
        tracing::info!(
            "Mail delivery via SMTP {}:{}",
            config.smtp_host,
            config.smtp_port
        );
        Ok(Arc::new(SmtpMailer::new(config)?))
    } else {
        tracing::warn!("MANDRILL_USERNAME/MANDRILL_PASSWORD not set; outgoing mail is only logged");
        Ok(Arc::new(LogMailer))
    }
}

/// SMTP delivery over STARTTLS
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self> {
        let username = config.username.clone().unwrap_or_default();
        let password = config.password.clone().unwrap_or_default();

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .with_context(|| format!("Failed to create SMTP transport for {}", config.smtp_host))?
            .credentials(Credentials::new(username, password))
            .port(config.smtp_port)
            .build();

        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| anyhow!("Invalid from address '{}': {}", config.from, e))?;

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        let message = build_message(self.from.clone(), mail)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| anyhow!("Failed to send email to {}: {}", mail.to, e))?;
        tracing::info!("Sent mail to {}: {}", mail.to, mail.subject);
        Ok(())
    }
}

fn build_message(from: Mailbox, mail: &OutgoingMail) -> Result<Message> {
    let to = mail
        .to
        .parse::<Mailbox>()
        .map_err(|e| anyhow!("Invalid recipient '{}': {}", mail.to, e))?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(mail.subject.clone())
        .header(ContentType::TEXT_PLAIN)
        .body(mail.body.clone())
        .map_err(|e| anyhow!("Failed to build email: {}", e))
}

/// Writes mail to the log instead of sending it
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        tracing::info!(to = %mail.to, subject = %mail.subject, "Mail not sent (no SMTP credentials)");
        tracing::debug!("{}", mail.body);
        Ok(())
    }
}

/// Keeps every message in memory. Used by tests.
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow!("Mail outbox lock poisoned"))?
            .push(mail.clone());
        Ok(())
    }
}
