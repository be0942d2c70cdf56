//! Migration to create the channel_routing_ids table.
//!
//! Webhook deliveries do not always address a channel by its primary account id.
//! Alternate identifiers observed for a channel are kept here, keyed by the
//! identifier itself so that each one routes to exactly one channel.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ChannelRoutingIds::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ChannelRoutingIds::RoutingId)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ChannelRoutingIds::ChannelId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ChannelRoutingIds::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_channel_routing_ids_channel_id")
                            .from(ChannelRoutingIds::Table, ChannelRoutingIds::ChannelId)
                            .to(Channels::Table, Channels::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_channel_routing_ids_channel_id")
                    .table(ChannelRoutingIds::Table)
                    .col(ChannelRoutingIds::ChannelId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_channel_routing_ids_channel_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ChannelRoutingIds::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ChannelRoutingIds {
    Table,
    RoutingId,
    ChannelId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Channels {
    Table,
    Id,
}
