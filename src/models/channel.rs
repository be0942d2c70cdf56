//! Channel entity model
//!
//! A channel is one connected Instagram professional account owned by a tenant.
//! The access token is stored encrypted; only the channel repository decrypts it.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "channels")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    /// Primary routing identifier, known once authorization completes
    pub external_account_id: Option<String>,

    pub display_name: Option<String>,

    /// AES-GCM envelope of the long-lived access token
    pub access_token_ciphertext: Option<Vec<u8>>,

    pub token_expires_at: Option<DateTimeWithTimeZone>,

    pub status: ChannelStatus,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

/// Lifecycle of a channel's authorization
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    #[sea_orm(string_value = "created")]
    #[default]
    Created,

    #[sea_orm(string_value = "connecting")]
    Connecting,

    #[sea_orm(string_value = "connected")]
    Connected,

    #[sea_orm(string_value = "disconnected")]
    Disconnected,

    #[sea_orm(string_value = "error")]
    Error,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::channel_routing_id::Entity")]
    RoutingIds,
    #[sea_orm(has_many = "super::automation::Entity")]
    Automations,
}

impl Related<super::channel_routing_id::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RoutingIds.def()
    }
}

impl Related<super::automation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Automations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
