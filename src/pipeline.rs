//! # Automation pipeline
//!
//! Drives one delivery through routing, persistence, matching, dispatch and
//! recording. Sub-events are processed sequentially in payload order, and an
//! error in one never affects the others.

use metrics::counter;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::dispatcher::{DispatchOutcome, DispatchStatus, ResponseDispatcher};
use crate::models::channel::ChannelStatus;
use crate::notifier::{LiveUpdate, NotifierHandle};
use crate::recorder::InteractionRecorder;
use crate::repositories::{ChannelRepository, EventRepository};
use crate::rules::RuleMatcher;
use crate::webhook::{InboundEvent, RoutedEvent, WebhookPayload};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    UnknownChannel,
    Disconnected,
    /// Authored by the channel's own account
    OwnInteraction,
    Duplicate,
}

impl IgnoreReason {
    fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::UnknownChannel => "unknown_channel",
            IgnoreReason::Disconnected => "disconnected",
            IgnoreReason::OwnInteraction => "own_interaction",
            IgnoreReason::Duplicate => "duplicate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Ignored(IgnoreReason),
    /// Stored, but no automation matched; nothing sent, no report
    Unmatched,
    Dispatched {
        report_id: Uuid,
        status: DispatchStatus,
    },
}

impl EventOutcome {
    fn label(&self) -> &'static str {
        match self {
            EventOutcome::Ignored(reason) => reason.as_str(),
            EventOutcome::Unmatched => "unmatched",
            EventOutcome::Dispatched { .. } => "dispatched",
        }
    }
}

/// Per-delivery tally, mainly for logs and tests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliverySummary {
    pub outcomes: Vec<EventOutcome>,
    pub skipped: usize,
    pub errors: usize,
}

#[derive(Clone)]
pub struct AutomationEngine {
    channels: ChannelRepository,
    events: EventRepository,
    matcher: RuleMatcher,
    dispatcher: ResponseDispatcher,
    recorder: InteractionRecorder,
    notifier: NotifierHandle,
}

impl AutomationEngine {
    pub fn new(
        channels: ChannelRepository,
        events: EventRepository,
        matcher: RuleMatcher,
        dispatcher: ResponseDispatcher,
        recorder: InteractionRecorder,
        notifier: NotifierHandle,
    ) -> Self {
        Self {
            channels,
            events,
            matcher,
            dispatcher,
            recorder,
            notifier,
        }
    }

    /// Processes every sub-event of a delivery.
    pub async fn handle_delivery(&self, payload: WebhookPayload) -> DeliverySummary {
        let mut summary = DeliverySummary::default();

        if !payload.is_instagram() {
            warn!(object = ?payload.object, "Dropping delivery for unsupported object");
            return summary;
        }

        let (events, skipped) = payload.events();
        summary.skipped = skipped.len();
        for reason in &skipped {
            debug!(reason = ?reason, "Sub-event skipped");
        }

        for RoutedEvent { routing_key, event } in events {
            let span = info_span!(
                "sub_event",
                routing_key = %routing_key,
                kind = event.kind().as_str(),
                source_event_id = event.source_id()
            );

            match self.process_event(&routing_key, &event).instrument(span).await {
                Ok(outcome) => {
                    counter!("pipeline_events_total", "outcome" => outcome.label()).increment(1);
                    summary.outcomes.push(outcome);
                }
                Err(error) => {
                    counter!("pipeline_events_total", "outcome" => "error").increment(1);
                    warn!(
                        routing_key = %routing_key,
                        source_event_id = event.source_id(),
                        error = %error,
                        "Sub-event processing aborted"
                    );
                    summary.errors += 1;
                }
            }
        }

        summary
    }

    /// Routes, stores, matches, dispatches and records one event.
    pub async fn process_event(
        &self,
        routing_key: &str,
        event: &InboundEvent,
    ) -> Result<EventOutcome, PipelineError> {
        let Some(channel) = self.channels.resolve(routing_key).await? else {
            info!(routing_key, "No channel for routing key; event dropped");
            return Ok(EventOutcome::Ignored(IgnoreReason::UnknownChannel));
        };

        if channel.status == ChannelStatus::Disconnected {
            debug!(channel_id = %channel.id, "Channel disconnected; event ignored");
            return Ok(EventOutcome::Ignored(IgnoreReason::Disconnected));
        }

        if channel.external_account_id.as_deref() == Some(event.user_id()) {
            debug!(channel_id = %channel.id, "Event authored by the channel itself");
            return Ok(EventOutcome::Ignored(IgnoreReason::OwnInteraction));
        }

        if !self.events.insert(channel.id, event).await? {
            debug!(channel_id = %channel.id, "Duplicate delivery; already processed");
            return Ok(EventOutcome::Ignored(IgnoreReason::Duplicate));
        }

        let Some(rule) = self
            .matcher
            .find_match(channel.id, event.kind(), event.text())
            .await?
        else {
            return Ok(EventOutcome::Unmatched);
        };

        let outcome = match self.channels.credential(channel.id).await? {
            Some(credential) => self.dispatcher.dispatch(&credential, &rule, event).await,
            None => {
                warn!(channel_id = %channel.id, "Matched rule but channel has no credential");
                DispatchOutcome {
                    status: DispatchStatus::Failed,
                    response_text: rule.plan.stored_text().map(str::to_string),
                }
            }
        };

        let recorded = self
            .recorder
            .record(channel.id, channel.tenant_id, event, &rule, &outcome)
            .await?;

        self.notifier.notify(LiveUpdate {
            tenant_id: channel.tenant_id,
            channel_id: channel.id,
            report_id: recorded.id,
            automation_id: Some(rule.id),
            interaction_kind: event.kind(),
            status: outcome.status.into(),
            occurred_at: event.occurred_at(),
        });

        info!(
            channel_id = %channel.id,
            automation_id = %rule.id,
            report_id = %recorded.id,
            status = ?outcome.status,
            "Event processed"
        );

        Ok(EventOutcome::Dispatched {
            report_id: recorded.id,
            status: outcome.status,
        })
    }
}
