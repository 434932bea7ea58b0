//! SMTP transport using lettre.

use super::{MailTransport, OutboundMail, SentMail, TransportError};
use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_or_default, env_parse};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart},
    transport::smtp::{self, authentication::Credentials},
};
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub from_email: String,
    pub from_name: String,
    /// Optional for local relays such as Mailpit
    pub username: Option<String>,
    pub password: Option<String>,
    /// STARTTLS relay when true, plain connection otherwise
    pub use_tls: bool,
    pub timeout: Duration,
}

impl SmtpConfig {
    pub fn new(host: impl Into<String>, port: u16, from_email: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            from_email: from_email.into(),
            from_name: "CRM".to_string(),
            username: None,
            password: None,
            use_tls: false,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }
}

/// `SMTP_HOST` (localhost), `SMTP_PORT` (1025), `SMTP_FROM_EMAIL`, `SMTP_FROM_NAME`,
/// `SMTP_USERNAME`, `SMTP_PASSWORD`, `SMTP_USE_TLS` (false), `SMTP_TIMEOUT_SECS` (10)
impl FromEnv for SmtpConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_or_default("SMTP_HOST", "localhost"),
            port: env_parse("SMTP_PORT", "1025")?,
            from_email: env_or_default("SMTP_FROM_EMAIL", "noreply@localhost"),
            from_name: env_or_default("SMTP_FROM_NAME", "CRM"),
            username: std::env::var("SMTP_USERNAME").ok(),
            password: std::env::var("SMTP_PASSWORD").ok(),
            use_tls: env_parse("SMTP_USE_TLS", "false")?,
            timeout: Duration::from_secs(env_parse("SMTP_TIMEOUT_SECS", "10")?),
        })
    }
}

pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    host: String,
}

impl SmtpTransport {
    pub fn new(config: SmtpConfig) -> Result<Self, TransportError> {
        let from: Mailbox = format!("{} <{}>", config.from_name, config.from_email)
            .parse()
            .map_err(|e| TransportError::Permanent(format!("Invalid from address: {}", e)))?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| TransportError::Permanent(format!("Failed to create SMTP relay: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder.port(config.port).timeout(Some(config.timeout));
        if let (Some(username), Some(password)) = (config.username, config.password) {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            host: config.host,
        })
    }

    fn build_message(&self, mail: &OutboundMail) -> Result<Message, TransportError> {
        let to: Mailbox = if mail.to_name.is_empty() {
            mail.to.parse()
        } else {
            format!("{} <{}>", mail.to_name, mail.to).parse()
        }
        .map_err(|e| TransportError::Permanent(format!("Invalid recipient '{}': {}", mail.to, e)))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&mail.subject)
            .multipart(MultiPart::alternative_plain_html(
                mail.text.clone(),
                mail.html.clone(),
            ))
            .map_err(|e| TransportError::Permanent(format!("Failed to build message: {}", e)))
    }
}

/// Permanent (5xx) SMTP replies will fail the same way on retry.
fn classify(err: smtp::Error) -> TransportError {
    if err.is_permanent() {
        TransportError::Permanent(format!("SMTP rejected message: {}", err))
    } else {
        TransportError::Transient(format!("SMTP send failed: {}", err))
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send_mail(&self, mail: &OutboundMail) -> Result<SentMail, TransportError> {
        debug!(to = %mail.to, subject = %mail.subject, host = %self.host, "Sending email via SMTP");

        let message = self.build_message(mail)?;
        let response = self.transport.send(message).await.map_err(|e| {
            error!(to = %mail.to, error = %e, "Failed to send email via SMTP");
            classify(e)
        })?;

        let message_id = response.message().next().map(|s| s.to_string());
        info!(to = %mail.to, message_id = ?message_id, "Email sent via SMTP");

        Ok(SentMail { message_id })
    }

    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn health_check(&self) -> Result<(), TransportError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(TransportError::Transient(format!(
                "SMTP server {} did not accept NOOP",
                self.host
            ))),
            Err(e) => Err(classify(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> SmtpTransport {
        SmtpTransport::new(SmtpConfig::new("localhost", 1025, "reminders@crm.test")).unwrap()
    }

    #[test]
    fn test_smtp_config_from_env_defaults() {
        temp_env::with_vars_unset(["SMTP_HOST", "SMTP_PORT", "SMTP_USE_TLS"], || {
            let config = SmtpConfig::from_env().unwrap();
            assert_eq!(config.host, "localhost");
            assert_eq!(config.port, 1025);
            assert!(!config.use_tls);
        });
    }

    #[test]
    fn test_smtp_config_builder() {
        let config = SmtpConfig::new("smtp.example.com", 587, "a@example.com")
            .with_tls(true)
            .with_credentials("user".to_string(), "pass".to_string());
        assert!(config.use_tls);
        assert_eq!(config.username.as_deref(), Some("user"));
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_permanent() {
        let mail = OutboundMail {
            to: "not an address".to_string(),
            subject: "Your domain expires today".to_string(),
            ..Default::default()
        };
        let err = transport().build_message(&mail).unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_build_message_with_display_name() {
        let mail = OutboundMail {
            to: "ops@acme.test".to_string(),
            to_name: "Acme Ltd".to_string(),
            subject: "Your domain expires tomorrow".to_string(),
            html: "<p>hi</p>".to_string(),
            text: "hi".to_string(),
        };
        let message = transport().build_message(&mail).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Acme Ltd"));
        assert!(raw.contains("Subject: Your domain expires tomorrow"));
    }

    #[test]
    fn test_invalid_sender_rejected() {
        let result = SmtpTransport::new(SmtpConfig::new("localhost", 25, "nope"));
        assert!(matches!(result, Err(TransportError::Permanent(_))));
    }
}
