//! Migration to create the direct_messages and comments tables.
//!
//! Inbound events are stored verbatim alongside their extracted fields. The
//! unique indexes make re-delivered webhooks collapse onto the first insert.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DirectMessages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DirectMessages::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DirectMessages::ChannelId).uuid().not_null())
                    .col(
                        ColumnDef::new(DirectMessages::PlatformMessageId)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DirectMessages::SenderId).text().not_null())
                    .col(
                        ColumnDef::new(DirectMessages::RecipientId)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DirectMessages::Text).text().null())
                    .col(
                        ColumnDef::new(DirectMessages::SentAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DirectMessages::Payload).json_binary().not_null())
                    .col(
                        ColumnDef::new(DirectMessages::Replied)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(DirectMessages::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_direct_messages_channel_id")
                            .from(DirectMessages::Table, DirectMessages::ChannelId)
                            .to(Channels::Table, Channels::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_direct_messages_message_channel")
                    .table(DirectMessages::Table)
                    .col(DirectMessages::PlatformMessageId)
                    .col(DirectMessages::ChannelId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Comments::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Comments::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Comments::ChannelId).uuid().not_null())
                    .col(ColumnDef::new(Comments::CommentId).text().not_null())
                    .col(ColumnDef::new(Comments::MediaId).text().null())
                    .col(ColumnDef::new(Comments::CommenterId).text().not_null())
                    .col(ColumnDef::new(Comments::CommenterUsername).text().null())
                    .col(ColumnDef::new(Comments::Text).text().null())
                    .col(
                        ColumnDef::new(Comments::CommentedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Comments::Payload).json_binary().not_null())
                    .col(
                        ColumnDef::new(Comments::Replied)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Comments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_comments_channel_id")
                            .from(Comments::Table, Comments::ChannelId)
                            .to(Channels::Table, Channels::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_comments_comment_id")
                    .table(Comments::Table)
                    .col(Comments::CommentId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_comments_comment_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Comments::Table).to_owned())
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_direct_messages_message_channel")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(DirectMessages::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DirectMessages {
    Table,
    Id,
    ChannelId,
    PlatformMessageId,
    SenderId,
    RecipientId,
    Text,
    SentAt,
    Payload,
    Replied,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Comments {
    Table,
    Id,
    ChannelId,
    CommentId,
    MediaId,
    CommenterId,
    CommenterUsername,
    Text,
    CommentedAt,
    Payload,
    Replied,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Channels {
    Table,
    Id,
}
