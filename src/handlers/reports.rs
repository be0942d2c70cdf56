//! # Report Handlers
//!
//! Tenant-scoped interaction report listing with filters and opaque cursors.

use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{OperatorAuth, TenantExtension, TenantHeader};
use crate::cursor::{decode_cursor, encode_cursor};
use crate::error::{ApiError, validation_error};
use crate::handlers::types::{page_limit, rfc3339, to_utc};
use crate::models::automation::InteractionKind;
use crate::models::interaction_report::{Model, ReportStatus};
use crate::repositories::ReportFilter;
use crate::server::AppState;

#[derive(Debug, Default, Deserialize, Serialize, IntoParams, ToSchema)]
pub struct ListReportsQuery {
    pub channel_id: Option<Uuid>,
    pub interaction_kind: Option<InteractionKind>,
    pub status: Option<ReportStatus>,
    /// Inclusive lower bound on the interaction time
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the interaction time
    pub to: Option<DateTime<Utc>>,
    /// Page size (default 50, max 100)
    pub limit: Option<i64>,
    /// Opaque cursor from a previous page
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReportInfo {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(value_type = String)]
    pub channel_id: Uuid,
    pub interaction_kind: InteractionKind,
    pub comment_id: Option<String>,
    pub external_user_id: String,
    pub media_id: Option<String>,
    pub username: Option<String>,
    pub interaction_text: String,
    pub response_text: Option<String>,
    pub status: ReportStatus,
    #[schema(value_type = Option<String>)]
    pub automation_id: Option<Uuid>,
    pub occurred_at: String,
    pub created_at: String,
}

impl From<Model> for ReportInfo {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            channel_id: model.channel_id,
            interaction_kind: model.interaction_kind,
            comment_id: model.comment_id,
            external_user_id: model.external_user_id,
            media_id: model.media_id,
            username: model.username,
            interaction_text: model.interaction_text,
            response_text: model.response_text,
            status: model.status,
            automation_id: model.automation_id,
            occurred_at: rfc3339(&model.occurred_at),
            created_at: rfc3339(&model.created_at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReportsResponse {
    pub reports: Vec<ReportInfo>,
    /// Cursor for the next page; null on the last page
    pub next_cursor: Option<String>,
}

/// Lists interaction reports newest first
#[utoipa::path(
    get,
    path = "/reports",
    security(("bearer_auth" = [])),
    params(TenantHeader, ListReportsQuery),
    responses(
        (status = 200, description = "One page of reports", body = ReportsResponse),
        (status = 400, description = "Invalid filter, limit or cursor", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "operators"
)]
pub async fn list_reports(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    query: Result<Query<ListReportsQuery>, QueryRejection>,
) -> Result<Json<ReportsResponse>, ApiError> {
    let Query(query) = query?;
    let limit = page_limit(query.limit)?;

    if let (Some(from), Some(to)) = (query.from, query.to)
        && from >= to
    {
        return Err(validation_error(
            "Invalid time range",
            serde_json::json!({ "from": "must be earlier than 'to'" }),
        ));
    }

    let cursor = query.cursor.as_deref().map(decode_cursor).transpose()?;
    let filter = ReportFilter {
        channel_id: query.channel_id,
        interaction_kind: query.interaction_kind,
        status: query.status,
        occurred_after: query.from,
        occurred_before: query.to,
    };

    let mut rows = state
        .reports
        .list(tenant.0, filter, cursor, limit + 1)
        .await?;

    let next_cursor = if rows.len() as u64 > limit {
        rows.truncate(limit as usize);
        rows.last()
            .map(|last| encode_cursor(&to_utc(&last.occurred_at), &last.id))
    } else {
        None
    };

    Ok(Json(ReportsResponse {
        reports: rows.into_iter().map(ReportInfo::from).collect(),
        next_cursor,
    }))
}
