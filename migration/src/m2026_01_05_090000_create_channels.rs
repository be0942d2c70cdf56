//! Migration to create the channels table.
//!
//! A channel is one connected Instagram professional account owned by a tenant.
//! The access token is stored encrypted and only populated once authorization
//! has completed.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Channels::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Channels::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Channels::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Channels::ExternalAccountId).text().null())
                    .col(ColumnDef::new(Channels::DisplayName).text().null())
                    .col(
                        ColumnDef::new(Channels::AccessTokenCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Channels::TokenExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Channels::Status)
                            .text()
                            .not_null()
                            .default("created"),
                    )
                    .col(
                        ColumnDef::new(Channels::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Channels::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Primary routing identifier is unique system-wide
        manager
            .create_index(
                Index::create()
                    .name("idx_channels_external_account_id")
                    .table(Channels::Table)
                    .col(Channels::ExternalAccountId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_channels_tenant_id")
                    .table(Channels::Table)
                    .col(Channels::TenantId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_channels_external_account_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_channels_tenant_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Channels::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Channels {
    Table,
    Id,
    TenantId,
    ExternalAccountId,
    DisplayName,
    AccessTokenCiphertext,
    TokenExpiresAt,
    Status,
    CreatedAt,
    UpdatedAt,
}
