//! # API Handlers
//!
//! HTTP endpoints: service info, health, webhook intake and the operator
//! management surface.

pub mod automations;
pub mod channels;
pub mod reports;
pub mod types;
pub mod webhooks;

use axum::{extract::State, response::Json};

use crate::db;
use crate::error::{ApiError, ErrorType};
use crate::models::ServiceInfo;
use crate::server::AppState;

const HEALTH_RETRY_AFTER_SECONDS: u64 = 5;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Database-backed liveness probe
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service and database are healthy"),
        (status = 503, description = "Database unavailable", body = ApiError)
    ),
    tag = "root"
)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    db::health_check(&state.db).await.map_err(|error| {
        tracing::error!(error = ?error, "Health check failed");
        ApiError::from(ErrorType::ServiceUnavailable).with_retry_after(HEALTH_RETRY_AFTER_SECONDS)
    })?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}
