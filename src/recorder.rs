//! Interaction Recorder: one report row per matched event.

use anyhow::Result;
use uuid::Uuid;

use crate::dispatcher::{DispatchOutcome, DispatchStatus};
use crate::repositories::{EventRepository, NewReport, Recorded, ReportRepository};
use crate::rules::Rule;
use crate::webhook::InboundEvent;

#[derive(Debug, Clone)]
pub struct InteractionRecorder {
    reports: ReportRepository,
    events: EventRepository,
}

impl InteractionRecorder {
    pub fn new(reports: ReportRepository, events: EventRepository) -> Self {
        Self { reports, events }
    }

    /// Writes the report for `event` and flags the stored event as replied
    /// when the dispatch succeeded. Repeated calls return the first report.
    pub async fn record(
        &self,
        channel_id: Uuid,
        tenant_id: Uuid,
        event: &InboundEvent,
        rule: &Rule,
        outcome: &DispatchOutcome,
    ) -> Result<Recorded> {
        let recorded = self
            .reports
            .record(NewReport {
                channel_id,
                tenant_id,
                interaction_kind: event.kind(),
                source_event_id: event.source_id().to_string(),
                comment_id: event.comment_id().map(str::to_string),
                external_user_id: event.user_id().to_string(),
                media_id: event.media_id().map(str::to_string),
                username: event.username().map(str::to_string),
                interaction_text: event.text().to_string(),
                response_text: outcome.response_text.clone(),
                status: outcome.status.into(),
                automation_id: Some(rule.id),
                occurred_at: event.occurred_at(),
            })
            .await?;

        if !recorded.created {
            tracing::debug!(
                report_id = %recorded.id,
                source_event_id = event.source_id(),
                "Report already recorded for event"
            );
        }

        // The replied flag is a denormalized convenience
        if outcome.status == DispatchStatus::Sent
            && let Err(error) = self.events.mark_replied(channel_id, event).await
        {
            tracing::warn!(
                report_id = %recorded.id,
                source_event_id = event.source_id(),
                error = %error,
                "Failed to flag event as replied"
            );
        }

        Ok(recorded)
    }
}
