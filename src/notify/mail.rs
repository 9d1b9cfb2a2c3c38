//! Mail transport used by the notification sink.
//!
//! The sink only needs "send this subject and body"; the SMTP relay details
//! live in [`SmtpMailer`]. Tests substitute their own [`Mailer`].

use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::{Message as Email, SmtpTransport, Transport};

use crate::config::SmtpConfig;

/// How long a single SMTP submission may take before it is abandoned.
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail transport is not configured (missing {0})")]
    NotConfigured(&'static str),
    #[error("invalid mail address '{address}': {source}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },
    #[error("failed to build mail message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("SMTP submission failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Submits a single notification. No retries.
pub trait Mailer {
    fn send(&self, subject: &str, body: &str) -> Result<(), MailError>;
}

/// Plain SMTP relay submission (no authentication, no TLS), the way an
/// internal relay on port 25 is normally reached.
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    server: Option<String>,
    port: u16,
    from: Option<String>,
    to: Option<String>,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> Self {
        Self {
            server: cfg.server.clone(),
            port: cfg.port,
            from: cfg.from.clone(),
            to: cfg.to.clone(),
        }
    }

    /// Whether every field needed for a submission is present.
    pub fn is_configured(&self) -> bool {
        self.server.is_some() && self.from.is_some() && self.to.is_some()
    }

    fn mailbox(address: &str) -> Result<Mailbox, MailError> {
        address.parse::<Mailbox>().map_err(|source| MailError::Address {
            address: address.to_string(),
            source,
        })
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, subject: &str, body: &str) -> Result<(), MailError> {
        let server = self.server.as_deref().ok_or(MailError::NotConfigured("smtp.server"))?;
        let from = self.from.as_deref().ok_or(MailError::NotConfigured("smtp.from"))?;
        let to = self.to.as_deref().ok_or(MailError::NotConfigured("smtp.to"))?;

        let email = Email::builder()
            .from(Self::mailbox(from)?)
            .to(Self::mailbox(to)?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;

        let transport = SmtpTransport::builder_dangerous(server)
            .port(self.port)
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        log::debug!("Submitting notification '{subject}' via {server}:{}", self.port);
        transport.send(&email)?;
        Ok(())
    }
}
