//! Delivery parsing.
//!
//! A delivery is parsed leniently: the envelope must be JSON with an `entry`
//! list, but each messaging event or change is decoded on its own so a
//! malformed sub-event is skipped without affecting its siblings.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::event::{CommentEvent, DirectMessageEvent, InboundEvent};

/// The only `object` value this service processes
pub const INSTAGRAM_OBJECT: &str = "instagram";

const COMMENTS_FIELD: &str = "comments";

/// Unix timestamps above this are in milliseconds
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Entry {
    /// Account the entry is addressed to; the routing key
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub messaging: Vec<JsonValue>,
    #[serde(default)]
    pub changes: Vec<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct Participant {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessagingEvent {
    sender: Participant,
    recipient: Participant,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    message: Option<MessageBody>,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    mid: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    is_echo: bool,
}

#[derive(Debug, Deserialize)]
struct Change {
    field: String,
    value: JsonValue,
}

#[derive(Debug, Deserialize)]
struct CommentValue {
    id: String,
    #[serde(default)]
    text: Option<String>,
    from: CommentAuthor,
    #[serde(default)]
    media: Option<MediaRef>,
}

#[derive(Debug, Deserialize)]
struct CommentAuthor {
    id: String,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaRef {
    id: String,
}

/// A sub-event paired with the account it was delivered for
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedEvent {
    pub routing_key: String,
    pub event: InboundEvent,
}

/// Why a sub-event produced no [`RoutedEvent`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingEntryId,
    Echo,
    NoMessage,
    UnsupportedField(String),
    Malformed(String),
}

impl WebhookPayload {
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    pub fn is_instagram(&self) -> bool {
        self.object.as_deref() == Some(INSTAGRAM_OBJECT)
    }

    /// Every processable sub-event in payload order, plus what was skipped.
    pub fn events(&self) -> (Vec<RoutedEvent>, Vec<SkipReason>) {
        let mut events = Vec::new();
        let mut skipped = Vec::new();

        for entry in &self.entry {
            let Some(routing_key) = entry.id.as_deref().filter(|id| !id.is_empty()) else {
                skipped.push(SkipReason::MissingEntryId);
                continue;
            };

            for raw in &entry.messaging {
                match direct_message(raw) {
                    Ok(event) => events.push(RoutedEvent {
                        routing_key: routing_key.to_string(),
                        event: InboundEvent::DirectMessage(event),
                    }),
                    Err(reason) => skipped.push(reason),
                }
            }

            for raw in &entry.changes {
                match comment(raw, entry.time) {
                    Ok(event) => events.push(RoutedEvent {
                        routing_key: routing_key.to_string(),
                        event: InboundEvent::Comment(event),
                    }),
                    Err(reason) => skipped.push(reason),
                }
            }
        }

        (events, skipped)
    }
}

fn direct_message(raw: &JsonValue) -> Result<DirectMessageEvent, SkipReason> {
    let parsed: MessagingEvent = serde_json::from_value(raw.clone())
        .map_err(|e| SkipReason::Malformed(e.to_string()))?;
    let message = parsed.message.ok_or(SkipReason::NoMessage)?;
    if message.is_echo {
        return Err(SkipReason::Echo);
    }

    Ok(DirectMessageEvent {
        sender_id: parsed.sender.id,
        recipient_id: parsed.recipient.id,
        message_id: message.mid,
        text: message.text.unwrap_or_default(),
        timestamp: timestamp_or_now(parsed.timestamp),
        raw: raw.clone(),
    })
}

fn comment(raw: &JsonValue, entry_time: Option<i64>) -> Result<CommentEvent, SkipReason> {
    let change: Change =
        serde_json::from_value(raw.clone()).map_err(|e| SkipReason::Malformed(e.to_string()))?;
    if change.field != COMMENTS_FIELD {
        return Err(SkipReason::UnsupportedField(change.field));
    }
    let value: CommentValue = serde_json::from_value(change.value.clone())
        .map_err(|e| SkipReason::Malformed(e.to_string()))?;

    Ok(CommentEvent {
        comment_id: value.id,
        media_id: value.media.map(|m| m.id),
        commenter_id: value.from.id,
        commenter_username: value.from.username,
        text: value.text.unwrap_or_default(),
        timestamp: timestamp_or_now(entry_time),
        raw: change.value,
    })
}

/// Accepts seconds or milliseconds since the epoch.
fn timestamp_or_now(raw: Option<i64>) -> DateTime<Utc> {
    raw.and_then(|ts| {
        if ts > MILLIS_THRESHOLD {
            Utc.timestamp_millis_opt(ts).single()
        } else {
            Utc.timestamp_opt(ts, 0).single()
        }
    })
    .unwrap_or_else(Utc::now)
}
