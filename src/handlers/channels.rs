//! # Channel Handlers
//!
//! Tenant-scoped channel registration, credential attachment and removal.
//! Responses never include credential material, only whether one is stored.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{OperatorAuth, TenantExtension, TenantHeader};
use crate::error::{ApiError, conflict, not_found, validation_error};
use crate::handlers::types::rfc3339;
use crate::models::channel::{self, ChannelStatus};
use crate::repositories::{NewChannel, RoutingIdInUse};
use crate::server::AppState;

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CreateChannelRequest {
    pub display_name: Option<String>,
    /// Primary routing key; usually set when the credential is attached
    pub external_account_id: Option<String>,
    /// Alternate identifiers deliveries may be addressed to
    #[serde(default)]
    pub routing_ids: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct AttachCredentialRequest {
    pub external_account_id: String,
    /// Long-lived access token; stored encrypted
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChannelInfo {
    #[schema(value_type = String)]
    pub id: Uuid,
    pub external_account_id: Option<String>,
    pub display_name: Option<String>,
    pub status: ChannelStatus,
    pub routing_ids: Vec<String>,
    /// Whether an encrypted credential is stored
    pub has_credential: bool,
    pub token_expires_at: Option<String>,
    pub created_at: String,
}

impl ChannelInfo {
    fn new(model: channel::Model, routing_ids: Vec<String>) -> Self {
        Self {
            id: model.id,
            external_account_id: model.external_account_id,
            display_name: model.display_name,
            status: model.status,
            routing_ids,
            has_credential: model.access_token_ciphertext.is_some(),
            token_expires_at: model.token_expires_at.as_ref().map(rfc3339),
            created_at: rfc3339(&model.created_at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChannelsResponse {
    pub channels: Vec<ChannelInfo>,
}

fn write_error(error: anyhow::Error) -> ApiError {
    match error.downcast_ref::<RoutingIdInUse>() {
        Some(in_use) => conflict(&in_use.to_string()),
        None => error.into(),
    }
}

fn clean_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

async fn channel_info(state: &AppState, model: channel::Model) -> Result<ChannelInfo, ApiError> {
    let routing_ids = state.channels.routing_ids_for(model.id).await?;
    Ok(ChannelInfo::new(model, routing_ids))
}

/// Registers a channel in status `created`
#[utoipa::path(
    post,
    path = "/channels",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    request_body = CreateChannelRequest,
    responses(
        (status = 201, description = "Channel created", body = ChannelInfo),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 409, description = "Routing identifier already in use", body = ApiError)
    ),
    tag = "operators"
)]
pub async fn create_channel(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    body: Result<Json<CreateChannelRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ChannelInfo>), ApiError> {
    let Json(request) = body?;

    let mut routing_ids = Vec::with_capacity(request.routing_ids.len());
    for raw in &request.routing_ids {
        match clean_id(raw) {
            Some(id) => routing_ids.push(id),
            None => {
                return Err(validation_error(
                    "Invalid routing identifier",
                    json!({ "routing_ids": "identifiers must not be blank" }),
                ));
            }
        }
    }

    let new = NewChannel {
        display_name: request.display_name.as_deref().and_then(clean_id),
        external_account_id: request.external_account_id.as_deref().and_then(clean_id),
        routing_ids,
    };

    let model = state
        .channels
        .create(tenant.0, new)
        .await
        .map_err(write_error)?;

    Ok((StatusCode::CREATED, Json(channel_info(&state, model).await?)))
}

/// Lists the tenant's channels
#[utoipa::path(
    get,
    path = "/channels",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    responses(
        (status = 200, description = "Tenant channels", body = ChannelsResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "operators"
)]
pub async fn list_channels(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
) -> Result<Json<ChannelsResponse>, ApiError> {
    let models = state.channels.list_by_tenant(tenant.0).await?;

    let mut channels = Vec::with_capacity(models.len());
    for model in models {
        channels.push(channel_info(&state, model).await?);
    }

    Ok(Json(ChannelsResponse { channels }))
}

#[utoipa::path(
    get,
    path = "/channels/{id}",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("id" = String, Path, description = "Channel id")),
    responses(
        (status = 200, description = "Channel", body = ChannelInfo),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "operators"
)]
pub async fn get_channel(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    Path(id): Path<Uuid>,
) -> Result<Json<ChannelInfo>, ApiError> {
    let model = state
        .channels
        .find_by_id(tenant.0, id)
        .await?
        .ok_or_else(|| not_found("Channel not found"))?;

    Ok(Json(channel_info(&state, model).await?))
}

/// Stores the channel's long-lived credential and marks it `connected`
#[utoipa::path(
    put,
    path = "/channels/{id}/credential",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("id" = String, Path, description = "Channel id")),
    request_body = AttachCredentialRequest,
    responses(
        (status = 200, description = "Credential attached", body = ChannelInfo),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 404, description = "Not found", body = ApiError),
        (status = 409, description = "Account already bound to another channel", body = ApiError)
    ),
    tag = "operators"
)]
pub async fn attach_credential(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    Path(id): Path<Uuid>,
    body: Result<Json<AttachCredentialRequest>, JsonRejection>,
) -> Result<Json<ChannelInfo>, ApiError> {
    let Json(request) = body?;

    let Some(account_id) = clean_id(&request.external_account_id) else {
        return Err(validation_error(
            "Invalid credential",
            json!({ "external_account_id": "must not be blank" }),
        ));
    };
    if request.access_token.trim().is_empty() {
        return Err(validation_error(
            "Invalid credential",
            json!({ "access_token": "must not be blank" }),
        ));
    }

    if state.channels.find_by_id(tenant.0, id).await?.is_none() {
        return Err(not_found("Channel not found"));
    }

    let model = state
        .channels
        .attach_credential(id, &account_id, &request.access_token, request.expires_at)
        .await
        .map_err(write_error)?;

    Ok(Json(channel_info(&state, model).await?))
}

/// Deletes the channel and its routing identifiers
#[utoipa::path(
    delete,
    path = "/channels/{id}",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("id" = String, Path, description = "Channel id")),
    responses(
        (status = 204, description = "Channel deleted"),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "operators"
)]
pub async fn delete_channel(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.channels.delete(tenant.0, id).await? {
        tracing::info!(channel_id = %id, "Channel deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Channel not found"))
    }
}
