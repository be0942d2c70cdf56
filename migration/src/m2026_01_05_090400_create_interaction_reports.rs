//! Migration to create the interaction_reports table.
//!
//! One row per matched inbound event. The natural-key index on
//! (channel_id, interaction_kind, source_event_id) keeps recording idempotent.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(InteractionReports::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InteractionReports::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(InteractionReports::ChannelId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(InteractionReports::TenantId).uuid().not_null())
                    .col(
                        ColumnDef::new(InteractionReports::InteractionKind)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InteractionReports::SourceEventId)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(InteractionReports::CommentId).text().null())
                    .col(
                        ColumnDef::new(InteractionReports::ExternalUserId)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(InteractionReports::MediaId).text().null())
                    .col(ColumnDef::new(InteractionReports::Username).text().null())
                    .col(
                        ColumnDef::new(InteractionReports::InteractionText)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(InteractionReports::ResponseText).text().null())
                    .col(
                        ColumnDef::new(InteractionReports::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(InteractionReports::AutomationId).uuid().null())
                    .col(
                        ColumnDef::new(InteractionReports::OccurredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InteractionReports::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_interaction_reports_channel_id")
                            .from(InteractionReports::Table, InteractionReports::ChannelId)
                            .to(Channels::Table, Channels::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_interaction_reports_natural_key")
                    .table(InteractionReports::Table)
                    .col(InteractionReports::ChannelId)
                    .col(InteractionReports::InteractionKind)
                    .col(InteractionReports::SourceEventId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Report listing pages tenant rows newest first
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_interaction_reports_tenant_occurred ON interaction_reports (tenant_id, occurred_at DESC, id DESC)".to_string(),
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "DROP INDEX IF EXISTS idx_interaction_reports_tenant_occurred".to_string(),
            ))
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_interaction_reports_natural_key")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(InteractionReports::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum InteractionReports {
    Table,
    Id,
    ChannelId,
    TenantId,
    InteractionKind,
    SourceEventId,
    CommentId,
    ExternalUserId,
    MediaId,
    Username,
    InteractionText,
    ResponseText,
    Status,
    AutomationId,
    OccurredAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Channels {
    Table,
    Id,
}
