//! Shared fixtures for integration tests.
//!
//! In-memory SQLite with all migrations applied, a scripted platform that
//! records every outbound call, and builders for webhook payloads.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use automations::crypto::CryptoKey;
use automations::dispatcher::ResponseDispatcher;
use automations::notifier::NotifierHandle;
use automations::pipeline::AutomationEngine;
use automations::platform::{
    OutboundMessage, PlatformApi, Recipient, RefreshedCredential, SendError,
};
use automations::recorder::InteractionRecorder;
use automations::repositories::{
    AutomationRepository, ChannelRepository, EventRepository, NewChannel, ReportRepository,
};
use automations::rules::{AutomationDraft, RuleMatcher, validate};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use serde_json::{Value, json};
use uuid::Uuid;

pub const ACCOUNT_ID: &str = "17841400000000001";
pub const ACCESS_TOKEN: &str = "IGQV-long-lived-token";

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

pub fn test_crypto_key() -> CryptoKey {
    CryptoKey::new(vec![42u8; 32]).expect("32-byte key")
}

/// One outbound platform call, as the scripted platform saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    Message {
        token: String,
        recipient: Recipient,
        message: OutboundMessage,
    },
    Reply {
        token: String,
        comment_id: String,
        text: String,
    },
    Refresh {
        token: String,
    },
}

/// Records calls and answers from a script; unscripted calls succeed.
#[derive(Default)]
pub struct ScriptedPlatform {
    calls: Mutex<Vec<PlatformCall>>,
    failures: Mutex<VecDeque<Option<SendError>>>,
    refreshed: Mutex<Option<RefreshedCredential>>,
}

impl ScriptedPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues the outcome of the next calls in order; `None` is a success.
    pub fn script(&self, outcomes: Vec<Option<SendError>>) {
        self.failures.lock().unwrap().extend(outcomes);
    }

    pub fn fail_always_with(&self, status: u16) {
        let mut failures = self.failures.lock().unwrap();
        for _ in 0..64 {
            failures.push_back(Some(SendError::Http {
                status,
                body: "{}".to_string(),
            }));
        }
    }

    pub fn refresh_to(&self, credential: RefreshedCredential) {
        *self.refreshed.lock().unwrap() = Some(credential);
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(&self, call: PlatformCall) -> Result<(), SendError> {
        self.calls.lock().unwrap().push(call);
        match self.failures.lock().unwrap().pop_front() {
            Some(Some(error)) => Err(error),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl PlatformApi for ScriptedPlatform {
    async fn send_message(
        &self,
        access_token: &str,
        recipient: &Recipient,
        message: &OutboundMessage,
    ) -> Result<(), SendError> {
        self.answer(PlatformCall::Message {
            token: access_token.to_string(),
            recipient: recipient.clone(),
            message: message.clone(),
        })
    }

    async fn reply_to_comment(
        &self,
        access_token: &str,
        comment_id: &str,
        text: &str,
    ) -> Result<(), SendError> {
        self.answer(PlatformCall::Reply {
            token: access_token.to_string(),
            comment_id: comment_id.to_string(),
            text: text.to_string(),
        })
    }

    async fn refresh_credential(&self, access_token: &str) -> Result<RefreshedCredential, SendError> {
        self.answer(PlatformCall::Refresh {
            token: access_token.to_string(),
        })?;
        self.refreshed
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SendError::MalformedResponse("no refresh scripted".to_string()))
    }
}

/// Repositories and an engine wired over one database and platform
pub struct Harness {
    pub db: Arc<DatabaseConnection>,
    pub platform: Arc<ScriptedPlatform>,
    pub channels: ChannelRepository,
    pub automations: AutomationRepository,
    pub events: EventRepository,
    pub reports: ReportRepository,
    pub engine: AutomationEngine,
    pub tenant_id: Uuid,
}

impl Harness {
    pub async fn new() -> Result<Self> {
        let db = Arc::new(setup_test_db().await?);
        let platform = ScriptedPlatform::new();

        let channels = ChannelRepository::new(db.clone(), test_crypto_key());
        let automations = AutomationRepository::new(db.clone());
        let events = EventRepository::new(db.clone());
        let reports = ReportRepository::new(db.clone());

        let engine = AutomationEngine::new(
            channels.clone(),
            events.clone(),
            RuleMatcher::new(automations.clone()),
            ResponseDispatcher::new(platform.clone()),
            InteractionRecorder::new(reports.clone(), events.clone()),
            NotifierHandle::disabled(),
        );

        Ok(Self {
            db,
            platform,
            channels,
            automations,
            events,
            reports,
            engine,
            tenant_id: Uuid::new_v4(),
        })
    }

    /// A connected channel routed by `account_id`.
    pub async fn connected_channel(&self, account_id: &str) -> Result<Uuid> {
        let channel = self
            .channels
            .create(
                self.tenant_id,
                NewChannel {
                    display_name: Some("Shop".to_string()),
                    external_account_id: None,
                    routing_ids: Vec::new(),
                },
            )
            .await?;
        self.channels
            .attach_credential(channel.id, account_id, ACCESS_TOKEN, None)
            .await?;
        Ok(channel.id)
    }

    pub async fn automation(&self, channel_id: Uuid, definition: Value) -> Result<Uuid> {
        let draft: AutomationDraft = serde_json::from_value(definition)?;
        let validated = validate(&draft).map_err(|e| anyhow::anyhow!("{e:?}"))?;
        let model = self
            .automations
            .create(self.tenant_id, channel_id, &validated)
            .await?;
        Ok(model.id)
    }
}

/// A delivery carrying one direct message per `(message_id, sender, text)`.
pub fn dm_delivery(account_id: &str, messages: &[(&str, &str, &str)]) -> Value {
    let messaging: Vec<Value> = messages
        .iter()
        .map(|(mid, sender, text)| {
            json!({
                "sender": {"id": sender},
                "recipient": {"id": account_id},
                "timestamp": 1_767_600_000_000i64,
                "message": {"mid": mid, "text": text}
            })
        })
        .collect();

    json!({
        "object": "instagram",
        "entry": [{"id": account_id, "time": 1_767_600_000_000i64, "messaging": messaging}]
    })
}

/// A delivery carrying one comment change.
pub fn comment_delivery(account_id: &str, comment_id: &str, commenter: &str, text: &str) -> Value {
    json!({
        "object": "instagram",
        "entry": [{
            "id": account_id,
            "time": 1_767_600_000i64,
            "changes": [{
                "field": "comments",
                "value": {
                    "id": comment_id,
                    "text": text,
                    "from": {"id": commenter, "username": "fan"},
                    "media": {"id": "media-1"}
                }
            }]
        }]
    })
}

pub fn parse(value: Value) -> automations::webhook::WebhookPayload {
    automations::webhook::WebhookPayload::parse(value.to_string().as_bytes())
        .expect("payload parses")
}
