//! Outbound mail transports.

mod log;
mod sendgrid;
mod smtp;

pub use log::LogTransport;
pub use sendgrid::{SendGridConfig, SendGridTransport};
pub use smtp::{SmtpConfig, SmtpTransport};

use async_trait::async_trait;
use thiserror::Error;

/// A rendered reminder ready for a transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMail {
    pub to: String,
    /// Display name; may be empty
    pub to_name: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Provider acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub message_id: Option<String>,
}

/// Transport failure, split by whether a retry can help.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Connection, timeout, throttling or provider-side 5xx
    #[error("transient transport error: {0}")]
    Transient(String),

    /// Rejected recipient, bad credentials, malformed message
    #[error("permanent transport error: {0}")]
    Permanent(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Transient(_))
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send_mail(&self, mail: &OutboundMail) -> Result<SentMail, TransportError>;

    /// Provider name for logs and metrics
    fn name(&self) -> &'static str;

    async fn health_check(&self) -> Result<(), TransportError>;
}
