use super::{MailTransport, OutboundMail, SentMail, TransportError};
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

/// Logs reminders instead of sending them. Used when `MAIL_PROVIDER=log`.
#[derive(Debug, Clone, Default)]
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn send_mail(&self, mail: &OutboundMail) -> Result<SentMail, TransportError> {
        let message_id = format!("log-{}", Uuid::now_v7());
        info!(
            to = %mail.to,
            subject = %mail.subject,
            message_id = %message_id,
            body = %mail.text,
            "Reminder email (log transport)"
        );
        Ok(SentMail {
            message_id: Some(message_id),
        })
    }

    fn name(&self) -> &'static str {
        "log"
    }

    async fn health_check(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
