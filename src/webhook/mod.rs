//! # Webhook intake
//!
//! Inbound event types, lenient delivery parsing and signature checks.

pub mod event;
pub mod payload;
pub mod signature;

pub use event::{CommentEvent, DirectMessageEvent, InboundEvent};
pub use payload::{RoutedEvent, SkipReason, WebhookPayload};
pub use signature::{SIGNATURE_HEADER, SignatureError, verify_signature};
