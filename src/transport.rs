//! Outbound mail transport: SMTP via lettre.
//!
//! Every delivery opens its own connection, sends one message and closes
//! it. lettre's SMTP client is blocking, so each send runs on the blocking
//! pool and never stalls the cooperative scheduler.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;

use crate::config::SmtpConfig;
use crate::error::TransportError;

/// Capability to deliver one plain-text email.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, recipient: &str, subject: &str, body: &str)
    -> Result<(), TransportError>;
}

/// SMTP transport with a fresh connection per message.
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    pub fn sender(&self) -> &str {
        &self.config.sender
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, TransportError> {
    address
        .trim()
        .parse()
        .map_err(|e: lettre::address::AddressError| TransportError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Build the message for one delivery.
pub fn build_message(
    sender: &str,
    recipient: &str,
    subject: &str,
    body: &str,
) -> Result<Message, TransportError> {
    Message::builder()
        .from(parse_mailbox(sender)?)
        .to(parse_mailbox(recipient)?)
        .subject(subject)
        .body(body.to_string())
        .map_err(|e| TransportError::Build(e.to_string()))
}

/// Blocking send over a connection that lives for this call only.
fn send_blocking(config: &SmtpConfig, email: &Message) -> Result<(), TransportError> {
    let transport = match (&config.username, &config.password) {
        (Some(username), Some(password)) => SmtpTransport::relay(&config.host)
            .map_err(|e| TransportError::Send(format!("SMTP relay error: {e}")))?
            .port(config.port)
            .credentials(Credentials::new(
                username.clone(),
                password.expose_secret().to_string(),
            ))
            .build(),
        // Unauthenticated plain SMTP (e.g. a local MailHog).
        _ => SmtpTransport::builder_dangerous(&config.host)
            .port(config.port)
            .build(),
    };

    transport
        .send(email)
        .map(|_| ())
        .map_err(|e| TransportError::Send(e.to_string()))
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn deliver(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), TransportError> {
        let email = build_message(&self.config.sender, recipient, subject, body)?;
        let config = self.config.clone();

        tokio::task::spawn_blocking(move || send_blocking(&config, &email))
            .await
            .map_err(|e| TransportError::Worker(e.to_string()))??;

        tracing::info!("Email sent to {recipient}");
        Ok(())
    }
}
