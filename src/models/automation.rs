//! Automation entity model
//!
//! One user-defined rule: the interaction kind it listens to, its trigger, and
//! the response it sends. Rows are only ever written through the validation in
//! [`crate::rules::plan`], so a stored row always describes a legal plan.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "automations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    pub channel_id: Uuid,

    pub name: String,

    pub interaction_kind: InteractionKind,

    pub trigger_kind: TriggerKind,

    /// JSON array of keyword strings
    #[sea_orm(column_type = "JsonBinary")]
    pub keywords: JsonValue,

    pub response_kind: ResponseKind,

    pub response_text: Option<String>,

    /// JSON array of sequence steps
    #[sea_orm(column_type = "JsonBinary")]
    pub response_sequence: Option<JsonValue>,

    /// Legacy delay applied before text-only sends
    pub delay_seconds: i32,

    pub is_active: bool,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

/// Which inbound interaction an automation (or a report) concerns
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
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    #[sea_orm(string_value = "direct_message")]
    DirectMessage,

    #[sea_orm(string_value = "comment")]
    Comment,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::DirectMessage => "direct_message",
            InteractionKind::Comment => "comment",
        }
    }
}

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
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    #[sea_orm(string_value = "keywords")]
    Keywords,

    #[sea_orm(string_value = "match_all")]
    MatchAll,
}

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
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    #[sea_orm(string_value = "reply_in_place")]
    ReplyInPlace,

    #[sea_orm(string_value = "reply_via_direct_message")]
    ReplyViaDirectMessage,

    #[sea_orm(string_value = "reply_in_place_and_direct_message")]
    ReplyInPlaceAndDirectMessage,
}

impl ResponseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseKind::ReplyInPlace => "reply_in_place",
            ResponseKind::ReplyViaDirectMessage => "reply_via_direct_message",
            ResponseKind::ReplyInPlaceAndDirectMessage => "reply_in_place_and_direct_message",
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::channel::Entity",
        from = "Column::ChannelId",
        to = "super::channel::Column::Id"
    )]
    Channel,
}

impl Related<super::channel::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Channel.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
