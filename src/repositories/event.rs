//! Inbound event log.
//!
//! Every accepted direct message and comment is stored before it is matched.
//! The unique natural keys double as the duplicate-delivery guard: an insert
//! that hits an existing row reports `false` and the event is not processed
//! again.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::models::comment::{self, Entity as Comment};
use crate::models::direct_message::{self, Entity as DirectMessage};
use crate::webhook::{CommentEvent, DirectMessageEvent, InboundEvent};

#[derive(Debug, Clone)]
pub struct EventRepository {
    pub db: Arc<DatabaseConnection>,
}

impl EventRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Stores the event; returns false when it was already stored.
    pub async fn insert(&self, channel_id: Uuid, event: &InboundEvent) -> Result<bool> {
        match event {
            InboundEvent::DirectMessage(dm) => self.insert_direct_message(channel_id, dm).await,
            InboundEvent::Comment(c) => self.insert_comment(channel_id, c).await,
        }
    }

    pub async fn insert_direct_message(
        &self,
        channel_id: Uuid,
        event: &DirectMessageEvent,
    ) -> Result<bool> {
        let row = direct_message::ActiveModel {
            id: Set(Uuid::new_v4()),
            channel_id: Set(channel_id),
            platform_message_id: Set(event.message_id.clone()),
            sender_id: Set(event.sender_id.clone()),
            recipient_id: Set(event.recipient_id.clone()),
            text: Set(non_empty(&event.text)),
            sent_at: Set(event.timestamp.into()),
            payload: Set(event.raw.clone()),
            replied: Set(false),
            created_at: Set(Utc::now().into()),
        };

        let inserted = DirectMessage::insert(row)
            .on_conflict(
                OnConflict::columns([
                    direct_message::Column::PlatformMessageId,
                    direct_message::Column::ChannelId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;

        Ok(inserted > 0)
    }

    pub async fn insert_comment(&self, channel_id: Uuid, event: &CommentEvent) -> Result<bool> {
        let row = comment::ActiveModel {
            id: Set(Uuid::new_v4()),
            channel_id: Set(channel_id),
            comment_id: Set(event.comment_id.clone()),
            media_id: Set(event.media_id.clone()),
            commenter_id: Set(event.commenter_id.clone()),
            commenter_username: Set(event.commenter_username.clone()),
            text: Set(non_empty(&event.text)),
            commented_at: Set(event.timestamp.into()),
            payload: Set(event.raw.clone()),
            replied: Set(false),
            created_at: Set(Utc::now().into()),
        };

        let inserted = Comment::insert(row)
            .on_conflict(
                OnConflict::column(comment::Column::CommentId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;

        Ok(inserted > 0)
    }

    /// Flags the stored event as answered.
    pub async fn mark_replied(&self, channel_id: Uuid, event: &InboundEvent) -> Result<()> {
        match event {
            InboundEvent::DirectMessage(dm) => {
                DirectMessage::update_many()
                    .col_expr(direct_message::Column::Replied, Expr::value(true))
                    .filter(direct_message::Column::ChannelId.eq(channel_id))
                    .filter(direct_message::Column::PlatformMessageId.eq(dm.message_id.as_str()))
                    .exec(&*self.db)
                    .await?;
            }
            InboundEvent::Comment(c) => {
                Comment::update_many()
                    .col_expr(comment::Column::Replied, Expr::value(true))
                    .filter(comment::Column::CommentId.eq(c.comment_id.as_str()))
                    .exec(&*self.db)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn find_direct_message(
        &self,
        channel_id: Uuid,
        message_id: &str,
    ) -> Result<Option<direct_message::Model>> {
        Ok(DirectMessage::find()
            .filter(direct_message::Column::ChannelId.eq(channel_id))
            .filter(direct_message::Column::PlatformMessageId.eq(message_id))
            .one(&*self.db)
            .await?)
    }

    pub async fn find_comment(&self, comment_id: &str) -> Result<Option<comment::Model>> {
        Ok(Comment::find()
            .filter(comment::Column::CommentId.eq(comment_id))
            .one(&*self.db)
            .await?)
    }
}

fn non_empty(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_string())
}
