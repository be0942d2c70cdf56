//! Stored inbound comments.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "comments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub channel_id: Uuid,

    /// Platform comment id, unique system-wide
    pub comment_id: String,

    pub media_id: Option<String>,

    pub commenter_id: String,

    pub commenter_username: Option<String>,

    pub text: Option<String>,

    pub commented_at: DateTimeWithTimeZone,

    /// Change value exactly as delivered
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: JsonValue,

    pub replied: bool,

    pub created_at: DateTimeWithTimeZone,
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
