//! # Data Models
//!
//! SeaORM entities for channels, automations, stored inbound events and
//! interaction reports.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod automation;
pub mod channel;
pub mod channel_routing_id;
pub mod comment;
pub mod direct_message;
pub mod interaction_report;

pub use automation::Entity as Automation;
pub use channel::Entity as Channel;
pub use channel_routing_id::Entity as ChannelRoutingId;
pub use comment::Entity as Comment;
pub use direct_message::Entity as DirectMessage;
pub use interaction_report::Entity as InteractionReport;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "poblysh-automations".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
