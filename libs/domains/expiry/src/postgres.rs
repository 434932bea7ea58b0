use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, SqlErr,
};
use uuid::Uuid;

use crate::{
    entity::{client, notification},
    error::{ExpiryError, ExpiryResult},
    models::{Client, DeliveryRecord, DeliveryStatus, NewNotification, Notification, ServiceType},
    repository::{ClientRegistry, NotificationStore},
};

fn registry_error(e: DbErr) -> ExpiryError {
    match e {
        DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => ExpiryError::RegistryUnavailable(e.to_string()),
        other => ExpiryError::Internal(format!("Database error: {}", other)),
    }
}

fn store_error(e: DbErr) -> ExpiryError {
    match e {
        DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => ExpiryError::StoreUnavailable(e.to_string()),
        other => ExpiryError::Internal(format!("Database error: {}", other)),
    }
}

/// Clients read from the CRM `clients` table.
pub struct PgClientRegistry {
    db: DatabaseConnection,
}

impl PgClientRegistry {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ClientRegistry for PgClientRegistry {
    async fn list_clients(&self) -> ExpiryResult<Vec<Client>> {
        let models = client::Entity::find()
            .order_by_asc(client::Column::Id)
            .all(&self.db)
            .await
            .map_err(registry_error)?;

        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn get_client_by_id(&self, id: &str) -> ExpiryResult<Option<Client>> {
        let model = client::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await
            .map_err(registry_error)?;

        Ok(model.map(Into::into))
    }
}

/// Notifications in `expiry_notifications`, deduplicated by the
/// `uq_expiry_notifications_event` unique index.
pub struct PgNotificationStore {
    db: DatabaseConnection,
}

impl PgNotificationStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn convert(models: Vec<notification::Model>) -> ExpiryResult<Vec<Notification>> {
    models.into_iter().map(Notification::try_from).collect()
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn find_existing(
        &self,
        client_id: &str,
        service_type: ServiceType,
        threshold_day: i32,
    ) -> ExpiryResult<Option<Notification>> {
        let model = notification::Entity::find()
            .filter(notification::Column::ClientId.eq(client_id))
            .filter(notification::Column::ServiceType.eq(service_type.to_string()))
            .filter(notification::Column::ThresholdDay.eq(threshold_day))
            .one(&self.db)
            .await
            .map_err(store_error)?;

        model.map(Notification::try_from).transpose()
    }

    async fn create(&self, input: NewNotification) -> ExpiryResult<Notification> {
        let client_id = input.client_id.clone();
        let service = input.service_type;
        let threshold_day = input.threshold_day;

        let active_model: notification::ActiveModel = input.into();
        let model = active_model.insert(&self.db).await.map_err(|e| {
            match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => ExpiryError::AlreadyNotified {
                    client_id: client_id.clone(),
                    service,
                    threshold_day,
                },
                _ => store_error(e),
            }
        })?;

        tracing::info!(
            notification_id = %model.id,
            client_id = %model.client_id,
            service = %model.service_type,
            threshold = model.threshold_day,
            "Created expiry notification"
        );
        Notification::try_from(model)
    }

    async fn mark_read(&self, id: Uuid) -> ExpiryResult<bool> {
        let result = notification::Entity::update_many()
            .col_expr(notification::Column::IsRead, Expr::value(true))
            .filter(notification::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .map_err(store_error)?;

        Ok(result.rows_affected > 0)
    }

    async fn get_by_id(&self, id: Uuid) -> ExpiryResult<Option<Notification>> {
        let model = notification::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(store_error)?;

        model.map(Notification::try_from).transpose()
    }

    async fn list_for_client(
        &self,
        client_id: &str,
        unread_only: bool,
    ) -> ExpiryResult<Vec<Notification>> {
        let mut query =
            notification::Entity::find().filter(notification::Column::ClientId.eq(client_id));
        if unread_only {
            query = query.filter(notification::Column::IsRead.eq(false));
        }

        let models = query
            .order_by_desc(notification::Column::CreatedAt)
            .order_by_desc(notification::Column::Id)
            .all(&self.db)
            .await
            .map_err(store_error)?;

        convert(models)
    }

    async fn list_undelivered(&self, max_attempts: i32) -> ExpiryResult<Vec<Notification>> {
        let models = notification::Entity::find()
            .filter(notification::Column::DeliveryStatus.is_not_in([
                DeliveryStatus::Sent.to_string(),
                DeliveryStatus::Rejected.to_string(),
            ]))
            .filter(notification::Column::DeliveryAttempts.lt(max_attempts))
            .order_by_asc(notification::Column::CreatedAt)
            .order_by_asc(notification::Column::Id)
            .all(&self.db)
            .await
            .map_err(store_error)?;

        convert(models)
    }

    async fn claim_delivery(
        &self,
        id: Uuid,
        claimed_at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> ExpiryResult<bool> {
        // Single conditional UPDATE; concurrent claimants serialise on the row lock
        let claimable = Condition::any()
            .add(notification::Column::DeliveryStatus.is_in([
                DeliveryStatus::Pending.to_string(),
                DeliveryStatus::Failed.to_string(),
            ]))
            .add(
                Condition::all()
                    .add(notification::Column::DeliveryStatus.eq(DeliveryStatus::Sending.to_string()))
                    .add(
                        Condition::any()
                            .add(notification::Column::DeliveryClaimedAt.is_null())
                            .add(notification::Column::DeliveryClaimedAt.lt(stale_before)),
                    ),
            );

        let result = notification::Entity::update_many()
            .col_expr(
                notification::Column::DeliveryStatus,
                Expr::value(DeliveryStatus::Sending.to_string()),
            )
            .col_expr(notification::Column::DeliveryClaimedAt, Expr::value(claimed_at))
            .filter(notification::Column::Id.eq(id))
            .filter(claimable)
            .exec(&self.db)
            .await
            .map_err(store_error)?;

        Ok(result.rows_affected == 1)
    }

    async fn record_delivery(&self, id: Uuid, record: DeliveryRecord) -> ExpiryResult<()> {
        let mut update = notification::Entity::update_many()
            .col_expr(
                notification::Column::DeliveryStatus,
                Expr::value(record.status.to_string()),
            )
            .col_expr(
                notification::Column::DeliveryAttempts,
                Expr::cust_with_values("delivery_attempts + $1", [record.attempts]),
            )
            .col_expr(
                notification::Column::LastDeliveryError,
                Expr::value(record.error.clone()),
            );
        if let Some(delivered_at) = record.delivered_at {
            update = update.col_expr(notification::Column::DeliveredAt, Expr::value(delivered_at));
        }

        let result = update
            .filter(notification::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .map_err(store_error)?;

        if result.rows_affected == 0 {
            return Err(ExpiryError::NotificationNotFound(id));
        }
        Ok(())
    }
}
