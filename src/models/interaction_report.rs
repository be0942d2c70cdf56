//! Interaction report entity model
//!
//! Audit row written once per matched inbound event, carrying the dispatch
//! outcome and, for text replies, the literal text that was sent.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::automation::InteractionKind;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "interaction_reports")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub channel_id: Uuid,

    pub tenant_id: Uuid,

    pub interaction_kind: InteractionKind,

    /// Platform message id or comment id of the triggering event
    pub source_event_id: String,

    pub comment_id: Option<String>,

    pub external_user_id: String,

    pub media_id: Option<String>,

    pub username: Option<String>,

    pub interaction_text: String,

    pub response_text: Option<String>,

    pub status: ReportStatus,

    pub automation_id: Option<Uuid>,

    /// When the platform says the interaction happened
    pub occurred_at: DateTimeWithTimeZone,

    pub created_at: DateTimeWithTimeZone,
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
    Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    #[sea_orm(string_value = "pending")]
    #[default]
    Pending,

    #[sea_orm(string_value = "sent")]
    Sent,

    #[sea_orm(string_value = "failed")]
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Sent => "sent",
            ReportStatus::Failed => "failed",
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
