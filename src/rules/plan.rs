//! Response plans and the decision table that says which plan shapes an
//! automation may carry.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::automation::{InteractionKind, ResponseKind};

/// Upper bound on steps in a response sequence
pub const MAX_SEQUENCE_STEPS: usize = 4;

/// What a single sequence step sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Text,
    Image,
    Video,
    Audio,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Text => "text",
            StepKind::Image => "image",
            StepKind::Video => "video",
            StepKind::Audio => "audio",
        }
    }

    /// Lowercase URL path extensions accepted for media steps. Empty for text.
    pub fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            StepKind::Text => &[],
            StepKind::Image => &["jpg", "jpeg", "png", "gif", "webp"],
            StepKind::Video => &["mp4", "mov", "webm"],
            StepKind::Audio => &["mp3", "m4a", "aac", "wav", "ogg"],
        }
    }

    pub fn is_media(&self) -> bool {
        !matches!(self, StepKind::Text)
    }
}

/// One validated step of a response sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SequenceStep {
    pub kind: StepKind,
    /// Literal text, or an HTTPS media URL for non-text kinds
    pub content: String,
    /// Wait before this step, measured from completion of the previous send
    pub delay_seconds: u32,
}

/// Body of a direct message: one text, or an ordered sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePayload {
    Text(String),
    Sequence(Vec<SequenceStep>),
}

/// What a matched automation does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePlan {
    /// Public reply under the triggering comment
    ReplyInPlace { text: String },
    /// Private message to the interacting user
    DirectMessage(MessagePayload),
    /// Public reply, then a private message addressed by comment id
    ReplyAndDirectMessage {
        reply: String,
        message: MessagePayload,
    },
}

impl ResponsePlan {
    /// Text persisted in the `response_text` column
    pub fn stored_text(&self) -> Option<&str> {
        match self {
            ResponsePlan::ReplyInPlace { text } => Some(text),
            ResponsePlan::DirectMessage(MessagePayload::Text(text)) => Some(text),
            ResponsePlan::DirectMessage(MessagePayload::Sequence(_)) => None,
            ResponsePlan::ReplyAndDirectMessage { reply, .. } => Some(reply),
        }
    }

    /// Steps persisted in the `response_sequence` column
    pub fn sequence(&self) -> Option<&[SequenceStep]> {
        match self {
            ResponsePlan::DirectMessage(MessagePayload::Sequence(steps))
            | ResponsePlan::ReplyAndDirectMessage {
                message: MessagePayload::Sequence(steps),
                ..
            } => Some(steps),
            _ => None,
        }
    }

    /// True when no part of the plan is a sequence
    pub fn is_text_only(&self) -> bool {
        self.sequence().is_none()
    }
}

/// Payload shape permitted for an (interaction kind, response kind) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadRule {
    Forbidden,
    TextOnly,
    TextOrSequence,
    /// Reply text is required; the message is the sequence if given, else the same text
    ReplyTextWithMessage,
}

/// The single source of truth for which plans are legal where.
pub fn payload_rule(interaction: InteractionKind, response: ResponseKind) -> PayloadRule {
    use InteractionKind::*;
    use ResponseKind::*;

    match (interaction, response) {
        (DirectMessage, ReplyViaDirectMessage) => PayloadRule::TextOrSequence,
        (DirectMessage, ReplyInPlace) | (DirectMessage, ReplyInPlaceAndDirectMessage) => {
            PayloadRule::Forbidden
        }
        (Comment, ReplyInPlace) => PayloadRule::TextOnly,
        (Comment, ReplyViaDirectMessage) => PayloadRule::TextOrSequence,
        (Comment, ReplyInPlaceAndDirectMessage) => PayloadRule::ReplyTextWithMessage,
    }
}
