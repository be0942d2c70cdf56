//! # Automation Handlers
//!
//! CRUD over automations. Every write goes through [`validate`], so a
//! rejected definition comes back as a 400 listing all violated rules.

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection, rejection::QueryRejection},
    http::StatusCode,
};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{OperatorAuth, TenantExtension, TenantHeader};
use crate::error::{ApiError, not_found};
use crate::handlers::types::rfc3339;
use crate::models::automation::{self, InteractionKind, ResponseKind, TriggerKind};
use crate::rules::{AutomationDraft, SequenceStep, SequenceStepInput, validate};
use crate::server::AppState;

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CreateAutomationRequest {
    #[schema(value_type = String)]
    pub channel_id: Uuid,
    #[serde(flatten)]
    pub definition: AutomationDraft,
}

/// Partial update; omitted fields keep their stored value and `null`
/// clears an optional payload field
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct UpdateAutomationRequest {
    pub name: Option<String>,
    pub interaction_kind: Option<InteractionKind>,
    pub trigger_kind: Option<TriggerKind>,
    pub keywords: Option<Vec<String>>,
    pub response_kind: Option<ResponseKind>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub response_text: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<Vec<SequenceStepInput>>)]
    pub response_sequence: Option<Option<Vec<SequenceStepInput>>>,
    pub delay_seconds: Option<i64>,
    pub is_active: Option<bool>,
}

/// Distinguishes an explicit `null` from an absent field.
fn present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl UpdateAutomationRequest {
    fn apply(self, draft: &mut AutomationDraft) {
        if let Some(name) = self.name {
            draft.name = name;
        }
        if let Some(kind) = self.interaction_kind {
            draft.interaction_kind = kind;
        }
        if let Some(kind) = self.trigger_kind {
            draft.trigger_kind = kind;
        }
        if let Some(keywords) = self.keywords {
            draft.keywords = keywords;
        }
        if let Some(kind) = self.response_kind {
            draft.response_kind = kind;
        }
        if let Some(text) = self.response_text {
            draft.response_text = text;
        }
        if let Some(sequence) = self.response_sequence {
            draft.response_sequence = sequence;
        }
        if let Some(delay) = self.delay_seconds {
            draft.delay_seconds = delay;
        }
        if let Some(active) = self.is_active {
            draft.is_active = active;
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AutomationInfo {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(value_type = String)]
    pub channel_id: Uuid,
    pub name: String,
    pub interaction_kind: InteractionKind,
    pub trigger_kind: TriggerKind,
    pub keywords: Vec<String>,
    pub response_kind: ResponseKind,
    pub response_text: Option<String>,
    pub response_sequence: Option<Vec<SequenceStep>>,
    pub delay_seconds: i32,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<automation::Model> for AutomationInfo {
    fn from(model: automation::Model) -> Self {
        Self {
            id: model.id,
            channel_id: model.channel_id,
            name: model.name,
            interaction_kind: model.interaction_kind,
            trigger_kind: model.trigger_kind,
            keywords: serde_json::from_value(model.keywords).unwrap_or_default(),
            response_kind: model.response_kind,
            response_text: model.response_text,
            response_sequence: model
                .response_sequence
                .and_then(|raw| serde_json::from_value(raw).ok()),
            delay_seconds: model.delay_seconds,
            is_active: model.is_active,
            created_at: rfc3339(&model.created_at),
            updated_at: rfc3339(&model.updated_at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AutomationsResponse {
    pub automations: Vec<AutomationInfo>,
}

#[derive(Debug, Deserialize, Serialize, IntoParams, ToSchema)]
pub struct ListAutomationsQuery {
    /// Only automations of this channel
    pub channel_id: Option<Uuid>,
}

/// Creates an automation after validating its definition
#[utoipa::path(
    post,
    path = "/automations",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    request_body = CreateAutomationRequest,
    responses(
        (status = 201, description = "Automation created", body = AutomationInfo),
        (status = 400, description = "Definition violates one or more rules", body = ApiError),
        (status = 404, description = "Channel not found", body = ApiError)
    ),
    tag = "operators"
)]
pub async fn create_automation(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    body: Result<Json<CreateAutomationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AutomationInfo>), ApiError> {
    let Json(request) = body?;

    if state
        .channels
        .find_by_id(tenant.0, request.channel_id)
        .await?
        .is_none()
    {
        return Err(not_found("Channel not found"));
    }

    let validated = validate(&request.definition)?;
    let model = state
        .automations
        .create(tenant.0, request.channel_id, &validated)
        .await?;

    Ok((StatusCode::CREATED, Json(model.into())))
}

/// Lists the tenant's automations, newest first
#[utoipa::path(
    get,
    path = "/automations",
    security(("bearer_auth" = [])),
    params(TenantHeader, ListAutomationsQuery),
    responses(
        (status = 200, description = "Tenant automations", body = AutomationsResponse),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "operators"
)]
pub async fn list_automations(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    query: Result<Query<ListAutomationsQuery>, QueryRejection>,
) -> Result<Json<AutomationsResponse>, ApiError> {
    let Query(query) = query?;
    let models = state
        .automations
        .list_by_tenant(tenant.0, query.channel_id)
        .await?;

    Ok(Json(AutomationsResponse {
        automations: models.into_iter().map(AutomationInfo::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/automations/{id}",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("id" = String, Path, description = "Automation id")),
    responses(
        (status = 200, description = "Automation", body = AutomationInfo),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "operators"
)]
pub async fn get_automation(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    Path(id): Path<Uuid>,
) -> Result<Json<AutomationInfo>, ApiError> {
    state
        .automations
        .find_by_id(tenant.0, id)
        .await?
        .map(|model| Json(model.into()))
        .ok_or_else(|| not_found("Automation not found"))
}

/// Merges the patch into the stored definition and revalidates the result
#[utoipa::path(
    patch,
    path = "/automations/{id}",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("id" = String, Path, description = "Automation id")),
    request_body = UpdateAutomationRequest,
    responses(
        (status = 200, description = "Automation updated", body = AutomationInfo),
        (status = 400, description = "Definition violates one or more rules", body = ApiError),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "operators"
)]
pub async fn update_automation(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateAutomationRequest>, JsonRejection>,
) -> Result<Json<AutomationInfo>, ApiError> {
    let Json(patch) = body?;

    let existing = state
        .automations
        .find_by_id(tenant.0, id)
        .await?
        .ok_or_else(|| not_found("Automation not found"))?;

    let mut draft = AutomationDraft::from_model(&existing);
    patch.apply(&mut draft);
    let validated = validate(&draft)?;

    let model = state.automations.update(tenant.0, id, &validated).await?;
    Ok(Json(model.into()))
}

#[utoipa::path(
    delete,
    path = "/automations/{id}",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("id" = String, Path, description = "Automation id")),
    responses(
        (status = 204, description = "Automation deleted"),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "operators"
)]
pub async fn delete_automation(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.automations.delete(tenant.0, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Automation not found"))
    }
}
