use sea_orm_migration::{prelude::*, schema::*};

use crate::m20260901_000000_create_clients::Clients;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ExpiryNotifications::Table)
                    .if_not_exists()
                    .col(pk_uuid(ExpiryNotifications::Id))
                    .col(
                        ColumnDef::new(ExpiryNotifications::ClientId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExpiryNotifications::ServiceType)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(integer(ExpiryNotifications::ThresholdDay))
                    .col(integer(ExpiryNotifications::DaysUntilExpiry))
                    .col(date(ExpiryNotifications::ExpiryDate))
                    .col(text(ExpiryNotifications::Message))
                    .col(boolean(ExpiryNotifications::IsRead).default(false))
                    .col(
                        ColumnDef::new(ExpiryNotifications::DeliveryStatus)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(integer(ExpiryNotifications::DeliveryAttempts).default(0))
                    .col(text_null(ExpiryNotifications::LastDeliveryError))
                    .col(timestamp_with_time_zone_null(
                        ExpiryNotifications::DeliveredAt,
                    ))
                    .col(timestamp_with_time_zone_null(
                        ExpiryNotifications::DeliveryClaimedAt,
                    ))
                    .col(
                        timestamp_with_time_zone(ExpiryNotifications::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_expiry_notifications_client")
                            .from(ExpiryNotifications::Table, ExpiryNotifications::ClientId)
                            .to(Clients::Table, Clients::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One notification per client, service and threshold; concurrent scans
        // race on this index and the loser gets a unique violation
        manager
            .create_index(
                Index::create()
                    .name("uq_expiry_notifications_event")
                    .table(ExpiryNotifications::Table)
                    .col(ExpiryNotifications::ClientId)
                    .col(ExpiryNotifications::ServiceType)
                    .col(ExpiryNotifications::ThresholdDay)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_expiry_notifications_client_unread")
                    .table(ExpiryNotifications::Table)
                    .col(ExpiryNotifications::ClientId)
                    .col(ExpiryNotifications::IsRead)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_expiry_notifications_delivery")
                    .table(ExpiryNotifications::Table)
                    .col(ExpiryNotifications::DeliveryStatus)
                    .col(ExpiryNotifications::DeliveryAttempts)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ExpiryNotifications::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ExpiryNotifications {
    Table,
    Id,
    ClientId,
    ServiceType,
    ThresholdDay,
    DaysUntilExpiry,
    ExpiryDate,
    Message,
    IsRead,
    DeliveryStatus,
    DeliveryAttempts,
    LastDeliveryError,
    DeliveredAt,
    DeliveryClaimedAt,
    CreatedAt,
}
