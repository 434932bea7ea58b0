//! Collaborator interfaces and their in-memory adapters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ExpiryError, ExpiryResult};
use crate::models::{
    Client, DeliveryRecord, DeliveryStatus, NewNotification, Notification, ServiceType,
};

/// Read-only access to CRM clients.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    async fn list_clients(&self) -> ExpiryResult<Vec<Client>>;

    async fn get_client_by_id(&self, id: &str) -> ExpiryResult<Option<Client>>;
}

/// Durable notification records.
///
/// Implementations enforce uniqueness of `(client_id, service_type, threshold_day)`
/// and report a collision as [`ExpiryError::AlreadyNotified`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn find_existing(
        &self,
        client_id: &str,
        service_type: ServiceType,
        threshold_day: i32,
    ) -> ExpiryResult<Option<Notification>>;

    async fn create(&self, input: NewNotification) -> ExpiryResult<Notification>;

    /// Returns false when no such notification exists
    async fn mark_read(&self, id: Uuid) -> ExpiryResult<bool>;

    async fn get_by_id(&self, id: Uuid) -> ExpiryResult<Option<Notification>>;

    /// Newest first
    async fn list_for_client(
        &self,
        client_id: &str,
        unread_only: bool,
    ) -> ExpiryResult<Vec<Notification>>;

    /// Notifications with fewer than `max_attempts` transport calls that are
    /// neither sent nor rejected, oldest first
    async fn list_undelivered(&self, max_attempts: i32) -> ExpiryResult<Vec<Notification>>;

    /// Atomically mark a notification `sending` so only one run emails it.
    ///
    /// Succeeds for `pending` and `failed` rows, and for `sending` rows claimed
    /// before `stale_before`. Returns false when the claim is held elsewhere,
    /// the email already went out, or the notification does not exist.
    async fn claim_delivery(
        &self,
        id: Uuid,
        claimed_at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> ExpiryResult<bool>;

    async fn record_delivery(&self, id: Uuid, record: DeliveryRecord) -> ExpiryResult<()>;
}

/// Client registry backed by a map; insertion order is not preserved.
#[derive(Debug, Default, Clone)]
pub struct InMemoryClientRegistry {
    clients: Arc<RwLock<HashMap<String, Client>>>,
}

impl InMemoryClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clients(clients: impl IntoIterator<Item = Client>) -> Self {
        let map = clients.into_iter().map(|c| (c.id.clone(), c)).collect();
        Self {
            clients: Arc::new(RwLock::new(map)),
        }
    }

    /// Insert or replace a client
    pub async fn upsert(&self, client: Client) {
        self.clients.write().await.insert(client.id.clone(), client);
    }
}

#[async_trait]
impl ClientRegistry for InMemoryClientRegistry {
    async fn list_clients(&self) -> ExpiryResult<Vec<Client>> {
        let clients = self.clients.read().await;
        let mut list: Vec<Client> = clients.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(list)
    }

    async fn get_client_by_id(&self, id: &str) -> ExpiryResult<Option<Client>> {
        Ok(self.clients.read().await.get(id).cloned())
    }
}

type EventKey = (String, ServiceType, i32);

#[derive(Debug, Default)]
struct StoreState {
    notifications: HashMap<Uuid, Notification>,
    by_event: HashMap<EventKey, Uuid>,
}

/// Notification store held in memory.
///
/// The uniqueness check and insert happen under one write lock, so concurrent
/// creates for the same event key see exactly one winner.
#[derive(Debug, Default, Clone)]
pub struct InMemoryNotificationStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.notifications.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Every stored notification, oldest first
    pub async fn all(&self) -> Vec<Notification> {
        let state = self.state.read().await;
        let mut list: Vec<Notification> = state.notifications.values().cloned().collect();
        list.sort_by_key(|n| n.id);
        list
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn find_existing(
        &self,
        client_id: &str,
        service_type: ServiceType,
        threshold_day: i32,
    ) -> ExpiryResult<Option<Notification>> {
        let state = self.state.read().await;
        let key = (client_id.to_string(), service_type, threshold_day);
        Ok(state
            .by_event
            .get(&key)
            .and_then(|id| state.notifications.get(id))
            .cloned())
    }

    async fn create(&self, input: NewNotification) -> ExpiryResult<Notification> {
        let mut state = self.state.write().await;
        let key = (input.client_id.clone(), input.service_type, input.threshold_day);

        if state.by_event.contains_key(&key) {
            return Err(ExpiryError::AlreadyNotified {
                client_id: input.client_id,
                service: input.service_type,
                threshold_day: input.threshold_day,
            });
        }

        let notification = Notification::from_new(input);
        state.by_event.insert(key, notification.id);
        state
            .notifications
            .insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn mark_read(&self, id: Uuid) -> ExpiryResult<bool> {
        let mut state = self.state.write().await;
        match state.notifications.get_mut(&id) {
            Some(notification) => {
                notification.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_by_id(&self, id: Uuid) -> ExpiryResult<Option<Notification>> {
        Ok(self.state.read().await.notifications.get(&id).cloned())
    }

    async fn list_for_client(
        &self,
        client_id: &str,
        unread_only: bool,
    ) -> ExpiryResult<Vec<Notification>> {
        let state = self.state.read().await;
        let mut list: Vec<Notification> = state
            .notifications
            .values()
            .filter(|n| n.client_id == client_id)
            .filter(|n| !unread_only || !n.is_read)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(list)
    }

    async fn list_undelivered(&self, max_attempts: i32) -> ExpiryResult<Vec<Notification>> {
        let state = self.state.read().await;
        let mut list: Vec<Notification> = state
            .notifications
            .values()
            .filter(|n| {
                !matches!(
                    n.delivery_status,
                    DeliveryStatus::Sent | DeliveryStatus::Rejected
                )
            })
            .filter(|n| n.delivery_attempts < max_attempts)
            .cloned()
            .collect();
        list.sort_by_key(|n| n.id);
        Ok(list)
    }

    async fn claim_delivery(
        &self,
        id: Uuid,
        claimed_at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> ExpiryResult<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .notifications
            .get_mut(&id)
            .is_some_and(|notification| notification.claim(claimed_at, stale_before)))
    }

    async fn record_delivery(&self, id: Uuid, record: DeliveryRecord) -> ExpiryResult<()> {
        let mut state = self.state.write().await;
        let notification = state
            .notifications
            .get_mut(&id)
            .ok_or(ExpiryError::NotificationNotFound(id))?;
        notification.apply_delivery(&record);
        Ok(())
    }
}
