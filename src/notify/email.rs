//! SMTP delivery of reviewer alerts via lettre.

use async_trait::async_trait;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use crate::error::NotifyError;
use crate::notify::{Notification, Notifier};

// ── Configuration ───────────────────────────────────────────────────

/// SMTP relay and reviewer list.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    /// The reviewer "topic": every alert goes to all of these.
    pub recipients: Vec<String>,
}

impl EmailConfig {
    /// Build config from a variable lookup.
    /// Returns `None` if `NOTIFY_SMTP_HOST` is not set (log-only alerts).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let smtp_host = lookup("NOTIFY_SMTP_HOST")?;

        let smtp_port: u16 = lookup("NOTIFY_SMTP_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = lookup("NOTIFY_SMTP_USERNAME").unwrap_or_default();
        let password = SecretString::from(lookup("NOTIFY_SMTP_PASSWORD").unwrap_or_default());
        let from_address = lookup("NOTIFY_FROM").unwrap_or_else(|| username.clone());

        let recipients: Vec<String> = lookup("NOTIFY_TO")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Some(Self {
            smtp_host,
            smtp_port,
            username,
            password,
            from_address,
            recipients,
        })
    }
}

// ── Notifier ────────────────────────────────────────────────────────

/// Sends each alert as one plain-text e-mail to every reviewer.
pub struct SmtpNotifier {
    transport: SmtpTransport,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl SmtpNotifier {
    /// Build the transport once. Addresses are validated here so a bad
    /// config fails at start-up rather than on the first alert.
    pub fn new(config: &EmailConfig) -> Result<Self, NotifyError> {
        let from = parse_mailbox(&config.from_address)?;
        let to = config
            .recipients
            .iter()
            .map(|r| parse_mailbox(r))
            .collect::<Result<Vec<_>, _>>()?;
        if to.is_empty() {
            return Err(NotifyError::InvalidAddress {
                address: String::new(),
                reason: "NOTIFY_TO lists no recipients".into(),
            });
        }

        let mut builder = SmtpTransport::relay(&config.smtp_host)
            .map_err(|e| NotifyError::Build(format!("SMTP relay error: {e}")))?
            .port(config.smtp_port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.expose_secret().to_string(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }

    fn build_message(&self, notification: &Notification) -> Result<Message, NotifyError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(notification.subject())
            .header(ContentType::TEXT_PLAIN);
        for mailbox in &self.to {
            builder = builder.to(mailbox.clone());
        }
        builder
            .body(notification.body())
            .map_err(|e| NotifyError::Build(e.to_string()))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address.parse().map_err(|e| NotifyError::InvalidAddress {
        address: address.to_string(),
        reason: format!("{e}"),
    })
}

#[async_trait]
impl Notifier for SmtpNotifier {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn publish(&self, notification: &Notification) -> Result<(), NotifyError> {
        let email = self.build_message(notification)?;
        let transport = self.transport.clone();

        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| NotifyError::SendFailed(format!("send task failed: {e}")))?
            .map_err(|e| NotifyError::SendFailed(format!("SMTP send failed: {e}")))?;

        tracing::info!(
            recipients = self.to.len(),
            domain = %notification.domain,
            item_id = %notification.item_id,
            "Review alert e-mailed"
        );
        Ok(())
    }
}
