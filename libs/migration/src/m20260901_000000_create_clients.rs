use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Expiry dates are kept as the CRM stores them and parsed at scan time
        manager
            .create_table(
                Table::create()
                    .table(Clients::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Clients::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(Clients::Name))
                    .col(string(Clients::Email))
                    .col(string_null(Clients::DomainExpiryDate))
                    .col(string_null(Clients::HostingExpiryDate))
                    .col(
                        timestamp_with_time_zone(Clients::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_clients_email")
                    .table(Clients::Table)
                    .col(Clients::Email)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Clients::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Clients {
    Table,
    Id,
    Name,
    Email,
    DomainExpiryDate,
    HostingExpiryDate,
    CreatedAt,
}
