//! # Platform API client
//!
//! Outbound calls to the messaging platform: private messages, public comment
//! replies and long-lived credential refresh. The dispatcher depends on the
//! [`PlatformApi`] trait so tests can substitute a scripted implementation.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use crate::config::GraphApiConfig;
use crate::rules::StepKind;

/// Errors returned by a single platform call
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("platform returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed platform response: {0}")]
    MalformedResponse(String),
}

impl SendError {
    /// True for credential problems that a retry will not fix.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, SendError::Http { status: 401 | 403, .. })
    }
}

impl From<reqwest::Error> for SendError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            SendError::MalformedResponse(error.to_string())
        } else {
            SendError::Network(error.to_string())
        }
    }
}

/// Who a private message is addressed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// A user id taken from an inbound direct message
    User(String),
    /// A private reply addressed through the comment it answers
    Comment(String),
}

impl Recipient {
    fn to_json(&self) -> JsonValue {
        match self {
            Recipient::User(id) => json!({ "id": id }),
            Recipient::Comment(id) => json!({ "comment_id": id }),
        }
    }
}

/// Body of one private message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Text(String),
    Attachment { kind: StepKind, url: String },
}

impl OutboundMessage {
    fn to_json(&self) -> JsonValue {
        match self {
            OutboundMessage::Text(text) => json!({ "text": text }),
            OutboundMessage::Attachment { kind, url } => json!({
                "attachment": {
                    "type": kind.as_str(),
                    "payload": { "url": url }
                }
            }),
        }
    }
}

/// Result of a credential refresh
#[derive(Debug, Clone)]
pub struct RefreshedCredential {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn send_message(
        &self,
        access_token: &str,
        recipient: &Recipient,
        message: &OutboundMessage,
    ) -> Result<(), SendError>;

    async fn reply_to_comment(
        &self,
        access_token: &str,
        comment_id: &str,
        text: &str,
    ) -> Result<(), SendError>;

    async fn refresh_credential(&self, access_token: &str) -> Result<RefreshedCredential, SendError>;
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// reqwest-backed [`PlatformApi`]
#[derive(Debug, Clone)]
pub struct GraphApiClient {
    http: reqwest::Client,
    base_url: String,
    version: String,
}

impl GraphApiClient {
    pub fn new(config: &GraphApiConfig) -> Result<Self, SendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("Poblysh-Automations/0.1")
            .build()
            .map_err(|e| SendError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            version: config.version.clone(),
        })
    }

    fn versioned(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.version, path)
    }

    async fn post_json(&self, url: String, access_token: &str, body: JsonValue) -> Result<(), SendError> {
        let response = self
            .http
            .post(url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(SendError::Http { status, body })
        }
    }
}

#[async_trait]
impl PlatformApi for GraphApiClient {
    async fn send_message(
        &self,
        access_token: &str,
        recipient: &Recipient,
        message: &OutboundMessage,
    ) -> Result<(), SendError> {
        let body = json!({
            "recipient": recipient.to_json(),
            "message": message.to_json(),
        });
        self.post_json(self.versioned("me/messages"), access_token, body)
            .await
    }

    async fn reply_to_comment(
        &self,
        access_token: &str,
        comment_id: &str,
        text: &str,
    ) -> Result<(), SendError> {
        let body = json!({ "message": text });
        self.post_json(
            self.versioned(&format!("{}/replies", comment_id)),
            access_token,
            body,
        )
        .await
    }

    async fn refresh_credential(&self, access_token: &str) -> Result<RefreshedCredential, SendError> {
        let response = self
            .http
            .get(format!("{}/refresh_access_token", self.base_url))
            .query(&[
                ("grant_type", "ig_refresh_token"),
                ("access_token", access_token),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Http { status, body });
        }

        let parsed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| SendError::MalformedResponse(e.to_string()))?;

        Ok(RefreshedCredential {
            access_token: parsed.access_token,
            expires_at: parsed
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        })
    }
}
