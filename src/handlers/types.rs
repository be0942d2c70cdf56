//! # Common API Types
//!
//! Shared request helpers for the management handlers.

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;

use crate::error::ApiError;

pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Validates an optional `limit` query parameter.
pub fn page_limit(limit: Option<i64>) -> Result<u64, ApiError> {
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            format!("limit must be between 1 and {}", MAX_PAGE_LIMIT).as_str(),
        ));
    }
    Ok(limit as u64)
}

/// RFC 3339 rendering in UTC
pub fn rfc3339(ts: &DateTimeWithTimeZone) -> String {
    ts.with_timezone(&Utc).to_rfc3339()
}

pub fn to_utc(ts: &DateTimeWithTimeZone) -> DateTime<Utc> {
    ts.with_timezone(&Utc)
}
