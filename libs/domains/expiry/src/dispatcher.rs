//! Best-effort reminder delivery with bounded retry.
//!
//! One dispatch walks an explicit state machine:
//!
//! ```text
//! Rendering ──render error──────────────────────────────▶ Failed (permanent)
//!     │
//!     ▼
//! Attempting(n) ──ok──────────────────────────────────▶ Delivered
//!     │  └──permanent error / n == max_attempts───────▶ Failed
//!     ▼ transient error
//! Backoff(n+1, delay) ──sleep──▶ Attempting(n+1)
//! ```
//!
//! Every transport call is recorded as a [`DeliveryAttempt`]; the caller gets
//! a [`DeliveryOutcome`] and never an error.

use chrono::NaiveDate;
use observability::ExpiryMetrics;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RetryPolicy;
use crate::models::{AttemptResult, Client, DeliveryAttempt, DeliveryOutcome, Notification, ServiceType};
use crate::providers::{MailTransport, OutboundMail, TransportError};
use crate::templates::{ReminderData, TemplateEngine};

#[derive(Debug)]
enum DispatchState {
    Rendering,
    Attempting { attempt: u32, mail: OutboundMail },
    Backoff { next_attempt: u32, delay: Duration, mail: OutboundMail },
    Delivered { message_id: Option<String> },
    Failed { error: String, permanent: bool },
}

/// What to send and to whom.
#[derive(Debug, Clone)]
pub struct ReminderRequest<'a> {
    pub notification_id: Option<Uuid>,
    pub client: &'a Client,
    pub service_type: ServiceType,
    pub days_until_expiry: i32,
    pub expiry_date: NaiveDate,
}

impl<'a> ReminderRequest<'a> {
    pub fn for_notification(notification: &Notification, client: &'a Client) -> Self {
        Self {
            notification_id: Some(notification.id),
            client,
            service_type: notification.service_type,
            days_until_expiry: notification.days_until_expiry,
            expiry_date: notification.expiry_date,
        }
    }
}

#[derive(Clone)]
pub struct MailDispatcher {
    transport: Arc<dyn MailTransport>,
    templates: TemplateEngine,
    policy: RetryPolicy,
    company_name: String,
}

impl MailDispatcher {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        templates: TemplateEngine,
        policy: RetryPolicy,
        company_name: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            templates,
            policy,
            company_name: company_name.into(),
        }
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    pub async fn health_check(&self) -> Result<(), TransportError> {
        self.transport.health_check().await
    }

    /// Send the reminder for a persisted notification.
    pub async fn send(&self, notification: &Notification, client: &Client) -> DeliveryOutcome {
        self.dispatch(ReminderRequest::for_notification(notification, client))
            .await
    }

    /// Drive one reminder through the state machine.
    pub async fn dispatch(&self, request: ReminderRequest<'_>) -> DeliveryOutcome {
        let provider = self.transport.name();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts: Vec<DeliveryAttempt> = Vec::new();
        let mut state = DispatchState::Rendering;

        loop {
            state = match state {
                DispatchState::Rendering => match self.render(&request) {
                    Ok(mail) => DispatchState::Attempting { attempt: 1, mail },
                    Err(error) => DispatchState::Failed {
                        error,
                        permanent: true,
                    },
                },

                DispatchState::Attempting { attempt, mail } => {
                    let result = self.transport.send_mail(&mail).await;
                    attempts.push(DeliveryAttempt {
                        notification_id: request.notification_id,
                        attempt_number: attempt,
                        outcome: if result.is_ok() {
                            AttemptResult::Success
                        } else {
                            AttemptResult::Failure
                        },
                        error: result.as_ref().err().map(|e| e.to_string()),
                    });

                    match result {
                        Ok(sent) => {
                            ExpiryMetrics::record_mail_attempt(provider, "ok");
                            DispatchState::Delivered {
                                message_id: sent.message_id,
                            }
                        }
                        Err(TransportError::Permanent(error)) => {
                            ExpiryMetrics::record_mail_attempt(provider, "permanent");
                            DispatchState::Failed {
                                error,
                                permanent: true,
                            }
                        }
                        Err(TransportError::Transient(error)) => {
                            ExpiryMetrics::record_mail_attempt(provider, "transient");
                            if attempt >= max_attempts {
                                DispatchState::Failed {
                                    error,
                                    permanent: false,
                                }
                            } else {
                                let delay = self.policy.backoff_before(attempt + 1);
                                debug!(
                                    to = %mail.to,
                                    attempt = attempt,
                                    delay_ms = delay.as_millis() as u64,
                                    error = %error,
                                    "Transient mail failure, backing off"
                                );
                                DispatchState::Backoff {
                                    next_attempt: attempt + 1,
                                    delay,
                                    mail,
                                }
                            }
                        }
                    }
                }

                DispatchState::Backoff {
                    next_attempt,
                    delay,
                    mail,
                } => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    DispatchState::Attempting {
                        attempt: next_attempt,
                        mail,
                    }
                }

                DispatchState::Delivered { message_id } => {
                    ExpiryMetrics::record_mail_delivery(provider, true, attempts.len());
                    info!(
                        client_id = %request.client.id,
                        service = %request.service_type,
                        attempts = attempts.len(),
                        "Expiry reminder delivered"
                    );
                    return DeliveryOutcome::Delivered {
                        message_id,
                        attempts,
                    };
                }

                DispatchState::Failed { error, permanent } => {
                    ExpiryMetrics::record_mail_delivery(provider, false, attempts.len());
                    warn!(
                        client_id = %request.client.id,
                        service = %request.service_type,
                        attempts = attempts.len(),
                        permanent = permanent,
                        error = %error,
                        "Expiry reminder not delivered"
                    );
                    return DeliveryOutcome::Failed {
                        error,
                        permanent,
                        attempts,
                    };
                }
            };
        }
    }

    fn render(&self, request: &ReminderRequest<'_>) -> Result<OutboundMail, String> {
        let client = request.client;
        if client.email.trim().is_empty() {
            return Err(format!("client {} has no email address", client.id));
        }

        let data = ReminderData::new(
            &client.name,
            request.service_type,
            request.days_until_expiry,
            request.expiry_date,
            &self.company_name,
        );
        let rendered = self
            .templates
            .render_reminder(&data)
            .map_err(|e| e.to_string())?;

        Ok(OutboundMail {
            to: client.email.trim().to_string(),
            to_name: client.name.clone(),
            subject: rendered.subject,
            html: rendered.html,
            text: rendered.text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{MockMailTransport, SentMail};
    use mockall::Sequence;

    fn client() -> Client {
        Client::new("c1", "Acme", "ops@acme.test")
    }

    fn request(client: &Client) -> ReminderRequest<'_> {
        ReminderRequest {
            notification_id: Some(Uuid::nil()),
            client,
            service_type: ServiceType::Hosting,
            days_until_expiry: 1,
            expiry_date: NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
        }
    }

    fn dispatcher(transport: MockMailTransport, max_attempts: u32) -> MailDispatcher {
        MailDispatcher::new(
            Arc::new(transport),
            TemplateEngine::new().unwrap(),
            RetryPolicy::immediate(max_attempts),
            "Hostly",
        )
    }

    fn mock() -> MockMailTransport {
        let mut transport = MockMailTransport::new();
        transport.expect_name().return_const("mock");
        transport
    }

    #[tokio::test]
    async fn test_delivered_first_try() {
        let mut transport = mock();
        transport
            .expect_send_mail()
            .withf(|mail| mail.to == "ops@acme.test" && mail.subject == "Your hosting plan expires tomorrow")
            .times(1)
            .returning(|_| {
                Ok(SentMail {
                    message_id: Some("m-1".to_string()),
                })
            });

        let client = client();
        let outcome = dispatcher(transport, 3).dispatch(request(&client)).await;

        assert!(outcome.is_delivered());
        assert_eq!(outcome.attempts().len(), 1);
        assert_eq!(outcome.attempts()[0].outcome, AttemptResult::Success);
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let mut transport = mock();
        let mut seq = Sequence::new();
        transport
            .expect_send_mail()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Err(TransportError::Transient("connection reset".to_string())));
        transport
            .expect_send_mail()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(SentMail { message_id: None }));

        let client = client();
        let outcome = dispatcher(transport, 3).dispatch(request(&client)).await;

        assert!(outcome.is_delivered());
        let numbers: Vec<u32> = outcome.attempts().iter().map(|a| a.attempt_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(outcome.attempts()[0].outcome, AttemptResult::Failure);
    }

    #[tokio::test]
    async fn test_exhausts_bounded_attempts() {
        let mut transport = mock();
        transport
            .expect_send_mail()
            .times(3)
            .returning(|_| Err(TransportError::Transient("timeout".to_string())));

        let client = client();
        let outcome = dispatcher(transport, 3).dispatch(request(&client)).await;

        match outcome {
            DeliveryOutcome::Failed {
                permanent,
                attempts,
                error,
            } => {
                assert!(!permanent);
                assert_eq!(attempts.len(), 3);
                assert_eq!(error, "timeout");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_permanent_error_short_circuits() {
        let mut transport = mock();
        transport
            .expect_send_mail()
            .times(1)
            .returning(|_| Err(TransportError::Permanent("550 no such user".to_string())));

        let client = client();
        let outcome = dispatcher(transport, 5).dispatch(request(&client)).await;

        assert!(matches!(outcome, DeliveryOutcome::Failed { permanent: true, .. }));
        assert_eq!(outcome.attempts().len(), 1);
        assert_eq!(outcome.error(), Some("550 no such user"));
    }

    #[tokio::test]
    async fn test_missing_address_never_reaches_transport() {
        let mut transport = mock();
        transport.expect_send_mail().never();

        let client = Client::new("c1", "Acme", "  ");
        let outcome = dispatcher(transport, 3).dispatch(request(&client)).await;

        assert!(matches!(outcome, DeliveryOutcome::Failed { permanent: true, .. }));
        assert!(outcome.attempts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let mut transport = mock();
        let mut seq = Sequence::new();
        transport
            .expect_send_mail()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(TransportError::Transient("busy".to_string())));
        transport
            .expect_send_mail()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(SentMail { message_id: None }));

        let dispatcher = MailDispatcher::new(
            Arc::new(transport),
            TemplateEngine::new().unwrap(),
            RetryPolicy::default(),
            "Hostly",
        );
        let client = client();
        let start = tokio::time::Instant::now();
        let outcome = dispatcher.dispatch(request(&client)).await;

        assert!(outcome.is_delivered());
        assert!(start.elapsed() >= Duration::from_millis(250));
    }
}
