//! SendGrid v3 HTTP transport.

use super::{MailTransport, OutboundMail, SentMail, TransportError};
use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_or_default, env_required};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct SendGridConfig {
    pub api_key: String,
    pub from_email: String,
    pub from_name: String,
    /// Overridable for tests and regional endpoints
    pub api_url: String,
}

impl SendGridConfig {
    pub fn new(api_key: impl Into<String>, from_email: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            from_email: from_email.into(),
            from_name: "CRM".to_string(),
            api_url: "https://api.sendgrid.com/v3".to_string(),
        }
    }
}

/// `SENDGRID_API_KEY`, `SENDGRID_FROM_EMAIL` (required), `SENDGRID_FROM_NAME`, `SENDGRID_API_URL`
impl FromEnv for SendGridConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: env_required("SENDGRID_API_KEY")?,
            from_email: env_required("SENDGRID_FROM_EMAIL")?,
            from_name: env_or_default("SENDGRID_FROM_NAME", "CRM"),
            api_url: env_or_default("SENDGRID_API_URL", "https://api.sendgrid.com/v3"),
        })
    }
}

pub struct SendGridTransport {
    config: SendGridConfig,
    client: Client,
}

impl SendGridTransport {
    pub fn new(config: SendGridConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| TransportError::Permanent(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn request_body(&self, mail: &OutboundMail) -> SendGridRequest {
        SendGridRequest {
            personalizations: vec![Personalization {
                to: vec![EmailAddress {
                    email: mail.to.clone(),
                    name: (!mail.to_name.is_empty()).then(|| mail.to_name.clone()),
                }],
            }],
            from: EmailAddress {
                email: self.config.from_email.clone(),
                name: Some(self.config.from_name.clone()),
            },
            subject: mail.subject.clone(),
            content: vec![
                Content {
                    content_type: "text/plain",
                    value: mail.text.clone(),
                },
                Content {
                    content_type: "text/html",
                    value: mail.html.clone(),
                },
            ],
        }
    }
}

#[derive(Debug, Serialize)]
struct SendGridRequest {
    personalizations: Vec<Personalization>,
    from: EmailAddress,
    subject: String,
    content: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Personalization {
    to: Vec<EmailAddress>,
}

#[derive(Debug, Serialize)]
struct EmailAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(rename = "type")]
    content_type: &'static str,
    value: String,
}

#[derive(Debug, Deserialize)]
struct SendGridErrors {
    errors: Vec<SendGridErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct SendGridErrorDetail {
    message: String,
}

/// 429 and 5xx are worth retrying; any other rejection is final.
fn classify_status(status: StatusCode, message: String) -> TransportError {
    let message = format!("SendGrid error ({}): {}", status, message);
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        TransportError::Transient(message)
    } else {
        TransportError::Permanent(message)
    }
}

fn error_message(body: String) -> String {
    match serde_json::from_str::<SendGridErrors>(&body) {
        Ok(parsed) => parsed
            .errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join(", "),
        Err(_) => body,
    }
}

#[async_trait]
impl MailTransport for SendGridTransport {
    async fn send_mail(&self, mail: &OutboundMail) -> Result<SentMail, TransportError> {
        debug!(to = %mail.to, subject = %mail.subject, "Sending email via SendGrid");

        let response = self
            .client
            .post(format!("{}/mail/send", self.config.api_url))
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(mail))
            .send()
            .await
            .map_err(|e| TransportError::Transient(format!("SendGrid request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            let message_id = response
                .headers()
                .get("x-message-id")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());
            info!(to = %mail.to, message_id = ?message_id, "Email sent via SendGrid");
            return Ok(SentMail { message_id });
        }

        let body = response.text().await.unwrap_or_default();
        error!(to = %mail.to, status = %status, error = %body, "SendGrid rejected email");
        Err(classify_status(status, error_message(body)))
    }

    fn name(&self) -> &'static str {
        "sendgrid"
    }

    async fn health_check(&self) -> Result<(), TransportError> {
        // No dedicated health endpoint; only the key format can be checked offline
        if self.config.api_key.starts_with("SG.") {
            Ok(())
        } else {
            Err(TransportError::Permanent(
                "Invalid SendGrid API key format".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()).is_retryable());
        assert!(classify_status(StatusCode::BAD_GATEWAY, String::new()).is_retryable());
        assert!(!classify_status(StatusCode::BAD_REQUEST, String::new()).is_retryable());
        assert!(!classify_status(StatusCode::UNAUTHORIZED, String::new()).is_retryable());
    }

    #[test]
    fn test_error_message_parsing() {
        let body = r#"{"errors":[{"message":"invalid to","field":"personalizations.0.to"},{"message":"bad from"}]}"#;
        assert_eq!(error_message(body.to_string()), "invalid to, bad from");
        assert_eq!(error_message("gateway timeout".to_string()), "gateway timeout");
    }

    #[test]
    fn test_request_body_shape() {
        let transport =
            SendGridTransport::new(SendGridConfig::new("SG.key", "reminders@crm.test")).unwrap();
        let body = serde_json::to_value(transport.request_body(&OutboundMail {
            to: "ops@acme.test".to_string(),
            to_name: String::new(),
            subject: "Your hosting plan expires today".to_string(),
            html: "<p>x</p>".to_string(),
            text: "x".to_string(),
        }))
        .unwrap();

        assert_eq!(body["personalizations"][0]["to"][0]["email"], "ops@acme.test");
        assert!(body["personalizations"][0]["to"][0].get("name").is_none());
        assert_eq!(body["content"][1]["type"], "text/html");
        assert_eq!(body["from"]["name"], "CRM");
    }

    #[tokio::test]
    async fn test_health_check_key_format() {
        let ok = SendGridTransport::new(SendGridConfig::new("SG.abc", "a@b.test")).unwrap();
        assert!(ok.health_check().await.is_ok());
        let bad = SendGridTransport::new(SendGridConfig::new("abc", "a@b.test")).unwrap();
        assert!(bad.health_check().await.is_err());
    }

    #[test]
    fn test_config_requires_api_key() {
        temp_env::with_vars_unset(["SENDGRID_API_KEY", "SENDGRID_FROM_EMAIL"], || {
            assert!(SendGridConfig::from_env().is_err());
        });
    }
}
