//! # Webhook Handlers
//!
//! Subscription handshake and delivery intake. A delivery is always
//! acknowledged with `200 EVENT_RECEIVED`; processing runs on a spawned task
//! that the response never waits for.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use utoipa::IntoParams;

use crate::error::{ApiError, ErrorType, not_found};
use crate::server::AppState;
use crate::telemetry::{TraceContext, current_trace_id, with_trace_context};
use crate::webhook::{SIGNATURE_HEADER, WebhookPayload, verify_signature};

/// The only route a delivery can arrive on
pub const INSTAGRAM_ROUTE: &str = "instagram";

pub const ACK_BODY: &str = "EVENT_RECEIVED";

const SUBSCRIBE_MODE: &str = "subscribe";

/// Handshake parameters sent by the platform
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    #[param(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    #[param(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    #[param(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Answers the subscription handshake by echoing the challenge
#[utoipa::path(
    get,
    path = "/webhook/{route}",
    params(
        ("route" = String, Path, description = "Webhook route, `instagram`"),
        VerifyQuery
    ),
    responses(
        (status = 200, description = "Challenge echoed", body = String, content_type = "text/plain"),
        (status = 403, description = "Mode or verify token mismatch", body = ApiError),
        (status = 404, description = "Unknown route", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn verify_subscription(
    State(state): State<AppState>,
    Path(route): Path<String>,
    Query(query): Query<VerifyQuery>,
) -> Result<Response, ApiError> {
    if route != INSTAGRAM_ROUTE {
        return Err(not_found("Unknown webhook route"));
    }

    let Some(expected) = state.config.webhook_verify_token.as_deref() else {
        tracing::warn!("Handshake received but no verify token is configured");
        return Err(ErrorType::Forbidden.into());
    };

    let mode_ok = query.mode.as_deref() == Some(SUBSCRIBE_MODE);
    let token_ok = query
        .verify_token
        .as_deref()
        .is_some_and(|token| bool::from(token.as_bytes().ct_eq(expected.as_bytes())));

    if !(mode_ok && token_ok) {
        tracing::warn!(mode = ?query.mode, "Webhook handshake rejected");
        return Err(ErrorType::Forbidden.into());
    }

    tracing::info!("Webhook subscription verified");
    Ok((StatusCode::OK, query.challenge.unwrap_or_default()).into_response())
}

/// Accepts a delivery and schedules its processing
#[utoipa::path(
    post,
    path = "/webhook/{route}",
    params(
        ("route" = String, Path, description = "Webhook route, `instagram`")
    ),
    request_body(content = String, description = "Platform delivery JSON", content_type = "application/json"),
    responses(
        (status = 200, description = "Always acknowledged", body = String, content_type = "text/plain")
    ),
    tag = "webhooks"
)]
pub async fn receive_delivery(
    State(state): State<AppState>,
    Path(route): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let ack = (StatusCode::OK, ACK_BODY);

    if route != INSTAGRAM_ROUTE {
        tracing::warn!(route = %route, "Delivery on unknown webhook route dropped");
        return ack;
    }

    if let Some(secret) = state.config.webhook_app_secret.as_deref() {
        let header = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if let Err(error) = verify_signature(&body, header, secret) {
            tracing::warn!(error = %error, "Delivery signature rejected; dropped");
            return ack;
        }
    }

    let payload = match WebhookPayload::parse(&body) {
        Ok(payload) => payload,
        Err(error) => {
            tracing::warn!(error = %error, body_size = body.len(), "Unparseable delivery dropped");
            return ack;
        }
    };

    let context = current_trace_id()
        .map(|trace_id| TraceContext { trace_id })
        .unwrap_or_else(TraceContext::generate);
    let engine = state.engine.clone();

    tokio::spawn(with_trace_context(context, async move {
        let summary = engine.handle_delivery(payload).await;
        tracing::debug!(
            processed = summary.outcomes.len(),
            skipped = summary.skipped,
            errors = summary.errors,
            "Delivery processed"
        );
    }));

    ack
}
