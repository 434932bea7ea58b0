//! Admission of expiry events against durable notification state.

use std::sync::Arc;
use tracing::debug;

use crate::error::{ExpiryError, ExpiryResult};
use crate::models::{ExpiryEvent, NewNotification, Notification};
use crate::repository::NotificationStore;

/// Result of pushing one event through the gate.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// First time this event key was seen; the record is persisted
    Created(Notification),
    /// A notification for this key already exists (found or lost a create race)
    Duplicate,
}

/// Ensures at most one notification per `(client, service, threshold)`.
///
/// [`admit`](Self::admit) is the cheap pre-check; [`persist`](Self::persist)
/// relies on the store's uniqueness constraint, so a concurrent run that
/// inserts the same key between the two calls still yields `Duplicate`.
#[derive(Clone)]
pub struct DedupGate {
    store: Arc<dyn NotificationStore>,
}

impl DedupGate {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    /// True when no notification exists yet for the event's key.
    pub async fn admit(&self, event: &ExpiryEvent) -> ExpiryResult<bool> {
        let existing = self
            .store
            .find_existing(&event.client_id, event.service_type, event.threshold_day)
            .await?;
        Ok(existing.is_none())
    }

    /// Admit and create in one step.
    pub async fn persist(&self, event: &ExpiryEvent, client_name: &str) -> ExpiryResult<Admission> {
        if !self.admit(event).await? {
            debug!(
                client_id = %event.client_id,
                service = %event.service_type,
                threshold = event.threshold_day,
                "Event already notified"
            );
            return Ok(Admission::Duplicate);
        }

        match self
            .store
            .create(NewNotification::from_event(event, client_name))
            .await
        {
            Ok(notification) => Ok(Admission::Created(notification)),
            Err(ExpiryError::AlreadyNotified { .. }) => {
                debug!(
                    client_id = %event.client_id,
                    service = %event.service_type,
                    threshold = event.threshold_day,
                    "Lost create race to a concurrent scan"
                );
                Ok(Admission::Duplicate)
            }
            Err(e) => Err(e),
        }
    }
}
