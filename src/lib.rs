//! # Automations Library
//!
//! Webhook-driven messaging automations: intake of platform deliveries,
//! rule matching, sequenced response dispatch and interaction reporting,
//! plus the operator API that manages channels and automations.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod cursor;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod models;
pub mod notifier;
pub mod pipeline;
pub mod platform;
pub mod recorder;
pub mod repositories;
pub mod rules;
pub mod server;
pub mod telemetry;
pub mod token_refresh;
pub mod webhook;
pub use migration;
