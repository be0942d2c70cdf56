//! # Interaction Report Repository
//!
//! Append-only audit rows for matched events, plus tenant-scoped listing with
//! keyset pagination ordered by `occurred_at DESC, id DESC`.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    Set,
};
use uuid::Uuid;

use crate::cursor::CursorData;
use crate::models::automation::InteractionKind;
use crate::models::interaction_report::{self, Entity as InteractionReport, Model, ReportStatus};

/// Everything needed to write one report row
#[derive(Debug, Clone)]
pub struct NewReport {
    pub channel_id: Uuid,
    pub tenant_id: Uuid,
    pub interaction_kind: InteractionKind,
    pub source_event_id: String,
    pub comment_id: Option<String>,
    pub external_user_id: String,
    pub media_id: Option<String>,
    pub username: Option<String>,
    pub interaction_text: String,
    pub response_text: Option<String>,
    pub status: ReportStatus,
    pub automation_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

/// Optional filters for report listing
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub channel_id: Option<Uuid>,
    pub interaction_kind: Option<InteractionKind>,
    pub status: Option<ReportStatus>,
    pub occurred_after: Option<DateTime<Utc>>,
    pub occurred_before: Option<DateTime<Utc>>,
}

/// Result of a record call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recorded {
    pub id: Uuid,
    /// False when a report for the same event already existed
    pub created: bool,
}

#[derive(Debug, Clone)]
pub struct ReportRepository {
    pub db: Arc<DatabaseConnection>,
}

impl ReportRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Writes the report once per (channel, kind, source event); a repeated
    /// call returns the id of the existing row untouched.
    pub async fn record(&self, report: NewReport) -> Result<Recorded> {
        let id = Uuid::new_v4();
        let row = interaction_report::ActiveModel {
            id: Set(id),
            channel_id: Set(report.channel_id),
            tenant_id: Set(report.tenant_id),
            interaction_kind: Set(report.interaction_kind),
            source_event_id: Set(report.source_event_id.clone()),
            comment_id: Set(report.comment_id),
            external_user_id: Set(report.external_user_id),
            media_id: Set(report.media_id),
            username: Set(report.username),
            interaction_text: Set(report.interaction_text),
            response_text: Set(report.response_text),
            status: Set(report.status),
            automation_id: Set(report.automation_id),
            occurred_at: Set(report.occurred_at.into()),
            created_at: Set(Utc::now().into()),
        };

        let inserted = InteractionReport::insert(row)
            .on_conflict(
                OnConflict::columns([
                    interaction_report::Column::ChannelId,
                    interaction_report::Column::InteractionKind,
                    interaction_report::Column::SourceEventId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;

        if inserted > 0 {
            return Ok(Recorded { id, created: true });
        }

        let existing = InteractionReport::find()
            .filter(interaction_report::Column::ChannelId.eq(report.channel_id))
            .filter(interaction_report::Column::InteractionKind.eq(report.interaction_kind))
            .filter(interaction_report::Column::SourceEventId.eq(report.source_event_id.as_str()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("report conflict without an existing row"))?;

        Ok(Recorded {
            id: existing.id,
            created: false,
        })
    }

    pub async fn find_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Model>> {
        Ok(InteractionReport::find_by_id(id)
            .filter(interaction_report::Column::TenantId.eq(tenant_id))
            .one(&*self.db)
            .await?)
    }

    /// Lists a tenant's reports newest first, resuming after `cursor`.
    pub async fn list(
        &self,
        tenant_id: Uuid,
        filter: ReportFilter,
        cursor: Option<CursorData>,
        limit: u64,
    ) -> Result<Vec<Model>> {
        let mut query =
            InteractionReport::find().filter(interaction_report::Column::TenantId.eq(tenant_id));

        if let Some(channel_id) = filter.channel_id {
            query = query.filter(interaction_report::Column::ChannelId.eq(channel_id));
        }
        if let Some(kind) = filter.interaction_kind {
            query = query.filter(interaction_report::Column::InteractionKind.eq(kind));
        }
        if let Some(status) = filter.status {
            query = query.filter(interaction_report::Column::Status.eq(status));
        }
        if let Some(after) = filter.occurred_after {
            query = query.filter(interaction_report::Column::OccurredAt.gte(after));
        }
        if let Some(before) = filter.occurred_before {
            query = query.filter(interaction_report::Column::OccurredAt.lt(before));
        }

        if let Some(cursor) = cursor {
            query = query.filter(
                Condition::any()
                    .add(interaction_report::Column::OccurredAt.lt(cursor.ts))
                    .add(
                        Condition::all()
                            .add(interaction_report::Column::OccurredAt.eq(cursor.ts))
                            .add(interaction_report::Column::Id.lt(cursor.id)),
                    ),
            );
        }

        Ok(query
            .order_by_desc(interaction_report::Column::OccurredAt)
            .order_by_desc(interaction_report::Column::Id)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }
}
