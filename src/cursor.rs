//! # Cursor Utilities
//!
//! Opaque keyset pagination cursors. A cursor is base64 of a small JSON
//! document naming the `(timestamp, id)` of the last row on the previous page.

use crate::error::ApiError;
use axum::http::StatusCode;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MAX_CURSOR_LEN: usize = 1000;
const MAX_DECODED_LEN: usize = 500;

/// Position of the last row handed out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorData {
    pub ts: DateTime<Utc>,
    pub id: Uuid,
}

fn invalid(message: &str) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message)
}

/// Encode cursor data as an opaque base64 string
pub fn encode_cursor(ts: &DateTime<Utc>, id: &Uuid) -> String {
    let json = serde_json::json!({ "ts": ts.to_rfc3339(), "id": id.to_string() });
    base64::engine::general_purpose::STANDARD.encode(json.to_string().as_bytes())
}

/// Decode cursor data from an opaque base64 string with validation
pub fn decode_cursor(cursor: &str) -> Result<CursorData, ApiError> {
    if cursor.is_empty() {
        return Err(invalid("cursor cannot be empty"));
    }

    if cursor.len() > MAX_CURSOR_LEN {
        return Err(invalid("cursor is too long"));
    }

    if !cursor
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
    {
        return Err(invalid("cursor contains invalid characters"));
    }

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(cursor)
        .map_err(|_| invalid("cursor is not valid base64"))?;

    if decoded.is_empty() || decoded.len() > MAX_DECODED_LEN {
        return Err(invalid("decoded cursor has an invalid size"));
    }

    let cursor_data: CursorData =
        serde_json::from_slice(&decoded).map_err(|_| invalid("cursor contains invalid JSON"))?;

    if cursor_data.id.is_nil() {
        return Err(invalid("cursor contains invalid ID"));
    }

    Ok(cursor_data)
}
