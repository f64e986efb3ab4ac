//! Mail notifier.
//!
//! Sends the HTML diff report to every configured recipient in one message.

use super::Notifier;
use crate::config::{SmtpSecurity, SmtpSettings};
use crate::diff::DiffResult;
use crate::error::NotifyError;
use crate::output::render_diff_html;
use crate::types::ScanRecord;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::info;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivers diff reports by mail.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
    subject: String,
}

impl SmtpNotifier {
    /// Build a notifier from the `[smtp]` section, or `None` when it is
    /// disabled or has no host.
    pub fn from_settings(settings: &SmtpSettings) -> Result<Option<Self>, NotifyError> {
        if !settings.is_active() {
            return Ok(None);
        }

        let mut builder = match settings.security {
            SmtpSecurity::Starttls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?
            }
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)?,
            SmtpSecurity::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(settings.host.as_str())
            }
        }
        .port(settings.port)
        .timeout(Some(SMTP_TIMEOUT));

        if !settings.user.is_empty() {
            builder = builder.credentials(Credentials::new(
                settings.user.clone(),
                settings.password.clone(),
            ));
        }

        Self::new(builder.build(), &settings.from, &settings.to)
            .map(|notifier| Some(notifier.with_subject(settings.subject.clone())))
    }

    pub fn new(
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: &str,
        to: &[String],
    ) -> Result<Self, NotifyError> {
        let to = to
            .iter()
            .map(|addr| parse_mailbox(addr))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            transport,
            from: parse_mailbox(from)?,
            to,
            subject: "Port Scanner Alert".to_string(),
        })
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Send one HTML message to all recipients.
    pub async fn send(&self, html: String) -> Result<(), NotifyError> {
        let mut message = Message::builder()
            .from(self.from.clone())
            .subject(self.subject.clone())
            .header(ContentType::TEXT_HTML);
        for recipient in &self.to {
            message = message.to(recipient.clone());
        }

        self.transport.send(message.body(html)?).await?;
        info!(recipients = self.to.len(), "mail notification sent");
        Ok(())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn notify(&self, diff: &DiffResult, _fresh: &[ScanRecord]) -> Result<(), NotifyError> {
        self.send(render_diff_html(diff)).await
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address.trim().parse().map_err(|source| NotifyError::Address {
        address: address.to_string(),
        source,
    })
}
