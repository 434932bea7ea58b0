use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ExpiryError;
use crate::models::{DeliveryStatus, NewNotification, Notification, ServiceType};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "expiry_notifications")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub client_id: String,
    pub service_type: String,
    pub threshold_day: i32,
    pub days_until_expiry: i32,
    pub expiry_date: Date,
    #[sea_orm(column_type = "Text")]
    pub message: String,
    pub is_read: bool,
    pub delivery_status: String,
    pub delivery_attempts: i32,
    #[sea_orm(column_type = "Text", nullable)]
    pub last_delivery_error: Option<String>,
    pub delivered_at: Option<DateTimeWithTimeZone>,
    pub delivery_claimed_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::client::Entity",
        from = "Column::ClientId",
        to = "super::client::Column::Id",
        on_delete = "Cascade"
    )]
    Client,
}

impl Related<super::client::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Client.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Notification {
    type Error = ExpiryError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let service_type = ServiceType::from_str(&model.service_type).map_err(|_| {
            ExpiryError::Internal(format!(
                "notification {} has unknown service type '{}'",
                model.id, model.service_type
            ))
        })?;
        let delivery_status = DeliveryStatus::from_str(&model.delivery_status).map_err(|_| {
            ExpiryError::Internal(format!(
                "notification {} has unknown delivery status '{}'",
                model.id, model.delivery_status
            ))
        })?;

        Ok(Self {
            id: model.id,
            client_id: model.client_id,
            service_type,
            threshold_day: model.threshold_day,
            days_until_expiry: model.days_until_expiry,
            expiry_date: model.expiry_date,
            message: model.message,
            is_read: model.is_read,
            delivery_status,
            delivery_attempts: model.delivery_attempts,
            last_delivery_error: model.last_delivery_error,
            delivered_at: model.delivered_at.map(Into::into),
            delivery_claimed_at: model.delivery_claimed_at.map(Into::into),
            created_at: model.created_at.into(),
        })
    }
}

impl From<NewNotification> for ActiveModel {
    fn from(input: NewNotification) -> Self {
        let now = chrono::Utc::now();
        ActiveModel {
            id: Set(Uuid::now_v7()),
            client_id: Set(input.client_id),
            service_type: Set(input.service_type.to_string()),
            threshold_day: Set(input.threshold_day),
            days_until_expiry: Set(input.days_until_expiry),
            expiry_date: Set(input.expiry_date),
            message: Set(input.message),
            is_read: Set(false),
            delivery_status: Set(DeliveryStatus::Pending.to_string()),
            delivery_attempts: Set(0),
            last_delivery_error: Set(None),
            delivered_at: Set(None),
            delivery_claimed_at: Set(None),
            created_at: Set(now.into()),
        }
    }
}
