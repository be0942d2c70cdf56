//! Normalized inbound events.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::models::automation::InteractionKind;

/// A private message sent to the channel
#[derive(Debug, Clone, PartialEq)]
pub struct DirectMessageEvent {
    pub sender_id: String,
    pub recipient_id: String,
    pub message_id: String,
    /// Empty for attachment-only messages
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// The messaging event as delivered
    pub raw: JsonValue,
}

/// A comment left on one of the channel's posts
#[derive(Debug, Clone, PartialEq)]
pub struct CommentEvent {
    pub comment_id: String,
    pub media_id: Option<String>,
    pub commenter_id: String,
    pub commenter_username: Option<String>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// The change value as delivered
    pub raw: JsonValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    DirectMessage(DirectMessageEvent),
    Comment(CommentEvent),
}

impl InboundEvent {
    pub fn kind(&self) -> InteractionKind {
        match self {
            InboundEvent::DirectMessage(_) => InteractionKind::DirectMessage,
            InboundEvent::Comment(_) => InteractionKind::Comment,
        }
    }

    /// Platform id of the message or comment
    pub fn source_id(&self) -> &str {
        match self {
            InboundEvent::DirectMessage(dm) => &dm.message_id,
            InboundEvent::Comment(c) => &c.comment_id,
        }
    }

    /// The external user who interacted with the channel
    pub fn user_id(&self) -> &str {
        match self {
            InboundEvent::DirectMessage(dm) => &dm.sender_id,
            InboundEvent::Comment(c) => &c.commenter_id,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            InboundEvent::DirectMessage(dm) => &dm.text,
            InboundEvent::Comment(c) => &c.text,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InboundEvent::DirectMessage(dm) => dm.timestamp,
            InboundEvent::Comment(c) => c.timestamp,
        }
    }

    pub fn comment_id(&self) -> Option<&str> {
        match self {
            InboundEvent::DirectMessage(_) => None,
            InboundEvent::Comment(c) => Some(&c.comment_id),
        }
    }

    pub fn media_id(&self) -> Option<&str> {
        match self {
            InboundEvent::DirectMessage(_) => None,
            InboundEvent::Comment(c) => c.media_id.as_deref(),
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            InboundEvent::DirectMessage(_) => None,
            InboundEvent::Comment(c) => c.commenter_username.as_deref(),
        }
    }

    pub fn raw(&self) -> &JsonValue {
        match self {
            InboundEvent::DirectMessage(dm) => &dm.raw,
            InboundEvent::Comment(c) => &c.raw,
        }
    }
}
