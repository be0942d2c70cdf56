//! Migration to create the automations table.
//!
//! Each row is one rule: which interactions it listens to, how it triggers, and
//! the response plan it executes. Sequence steps are stored as JSON.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Automations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Automations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Automations::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Automations::ChannelId).uuid().not_null())
                    .col(ColumnDef::new(Automations::Name).text().not_null())
                    .col(
                        ColumnDef::new(Automations::InteractionKind)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Automations::TriggerKind).text().not_null())
                    .col(ColumnDef::new(Automations::Keywords).json_binary().not_null())
                    .col(ColumnDef::new(Automations::ResponseKind).text().not_null())
                    .col(ColumnDef::new(Automations::ResponseText).text().null())
                    .col(
                        ColumnDef::new(Automations::ResponseSequence)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Automations::DelaySeconds)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Automations::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Automations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Automations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_automations_channel_id")
                            .from(Automations::Table, Automations::ChannelId)
                            .to(Channels::Table, Channels::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Active-rule lookup scans a channel's rules newest first
        manager
            .create_index(
                Index::create()
                    .name("idx_automations_channel_active_created")
                    .table(Automations::Table)
                    .col(Automations::ChannelId)
                    .col(Automations::IsActive)
                    .col(Automations::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_automations_tenant_id")
                    .table(Automations::Table)
                    .col(Automations::TenantId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_automations_channel_active_created")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_automations_tenant_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Automations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Automations {
    Table,
    Id,
    TenantId,
    ChannelId,
    Name,
    InteractionKind,
    TriggerKind,
    Keywords,
    ResponseKind,
    ResponseText,
    ResponseSequence,
    DelaySeconds,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Channels {
    Table,
    Id,
}
