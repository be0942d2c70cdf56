//! # Response Dispatcher
//!
//! Executes a matched rule's [`ResponsePlan`] against the platform API.
//!
//! Sequences run strictly in order. Before each step the dispatcher sleeps
//! that step's delay, measured from completion of the previous step (step 0
//! from the moment dispatch starts). The first failed send aborts the rest of
//! the plan; nothing is retried or rolled back.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::{debug, info, warn};

use crate::models::interaction_report::ReportStatus;
use crate::platform::{OutboundMessage, PlatformApi, Recipient, SendError};
use crate::repositories::ChannelCredential;
use crate::rules::{MessagePayload, ResponsePlan, Rule, SequenceStep};
use crate::webhook::InboundEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Sent,
    Failed,
}

impl From<DispatchStatus> for ReportStatus {
    fn from(status: DispatchStatus) -> Self {
        match status {
            DispatchStatus::Sent => ReportStatus::Sent,
            DispatchStatus::Failed => ReportStatus::Failed,
        }
    }
}

impl DispatchStatus {
    fn as_str(&self) -> &'static str {
        match self {
            DispatchStatus::Sent => "sent",
            DispatchStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub status: DispatchStatus,
    /// Literal reply text; `None` when the response was a sequence
    pub response_text: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("in-place reply requires a comment event")]
    NotAComment,

    #[error("step {step} failed: {source}")]
    Step {
        step: usize,
        #[source]
        source: SendError,
    },

    #[error("send failed: {0}")]
    Send(#[from] SendError),
}

#[derive(Clone)]
pub struct ResponseDispatcher {
    platform: Arc<dyn PlatformApi>,
}

impl ResponseDispatcher {
    pub fn new(platform: Arc<dyn PlatformApi>) -> Self {
        Self { platform }
    }

    /// Runs the rule's plan for `event`. Failures are folded into the outcome.
    pub async fn dispatch(
        &self,
        credential: &ChannelCredential,
        rule: &Rule,
        event: &InboundEvent,
    ) -> DispatchOutcome {
        let token = credential.access_token.as_str();

        if rule.plan.is_text_only() && rule.delay_seconds > 0 {
            debug!(
                automation_id = %rule.id,
                delay_seconds = rule.delay_seconds,
                "Applying response delay"
            );
            tokio::time::sleep(Duration::from_secs(u64::from(rule.delay_seconds))).await;
        }

        let result = self.execute(token, &rule.plan, event).await;

        let status = match &result {
            Ok(()) => DispatchStatus::Sent,
            Err(error) => {
                warn!(
                    automation_id = %rule.id,
                    channel_id = %rule.channel_id,
                    source_event_id = event.source_id(),
                    error = %error,
                    "Response dispatch failed"
                );
                DispatchStatus::Failed
            }
        };

        counter!("dispatch_outcomes_total", "status" => status.as_str()).increment(1);
        info!(
            automation_id = %rule.id,
            source_event_id = event.source_id(),
            status = status.as_str(),
            "Response dispatched"
        );

        DispatchOutcome {
            status,
            response_text: rule.plan.stored_text().map(str::to_string),
        }
    }

    async fn execute(
        &self,
        token: &str,
        plan: &ResponsePlan,
        event: &InboundEvent,
    ) -> Result<(), DispatchError> {
        match plan {
            ResponsePlan::ReplyInPlace { text } => {
                let comment_id = event.comment_id().ok_or(DispatchError::NotAComment)?;
                self.reply(token, comment_id, text).await
            }
            ResponsePlan::DirectMessage(payload) => {
                let recipient = Recipient::User(event.user_id().to_string());
                self.deliver(token, &recipient, payload).await
            }
            ResponsePlan::ReplyAndDirectMessage { reply, message } => {
                let comment_id = event.comment_id().ok_or(DispatchError::NotAComment)?;
                self.reply(token, comment_id, reply).await?;
                let recipient = Recipient::Comment(comment_id.to_string());
                self.deliver(token, &recipient, message).await
            }
        }
    }

    async fn reply(&self, token: &str, comment_id: &str, text: &str) -> Result<(), DispatchError> {
        let result = self.platform.reply_to_comment(token, comment_id, text).await;
        record_send("comment_reply", &result);
        Ok(result?)
    }

    async fn deliver(
        &self,
        token: &str,
        recipient: &Recipient,
        payload: &MessagePayload,
    ) -> Result<(), DispatchError> {
        match payload {
            MessagePayload::Text(text) => {
                let result = self
                    .platform
                    .send_message(token, recipient, &OutboundMessage::Text(text.clone()))
                    .await;
                record_send("message", &result);
                Ok(result?)
            }
            MessagePayload::Sequence(steps) => self.run_sequence(token, recipient, steps).await,
        }
    }

    async fn run_sequence(
        &self,
        token: &str,
        recipient: &Recipient,
        steps: &[SequenceStep],
    ) -> Result<(), DispatchError> {
        for (index, step) in steps.iter().enumerate() {
            if step.delay_seconds > 0 {
                tokio::time::sleep(Duration::from_secs(u64::from(step.delay_seconds))).await;
            }

            let message = if step.kind.is_media() {
                OutboundMessage::Attachment {
                    kind: step.kind,
                    url: step.content.clone(),
                }
            } else {
                OutboundMessage::Text(step.content.clone())
            };

            let result = self.platform.send_message(token, recipient, &message).await;
            record_send("sequence_step", &result);

            if let Err(source) = result {
                return Err(DispatchError::Step {
                    step: index,
                    source,
                });
            }
            debug!(step = index, kind = step.kind.as_str(), "Sequence step sent");
        }
        Ok(())
    }
}

fn record_send<T>(kind: &'static str, result: &Result<T, SendError>) {
    let outcome = if result.is_ok() { "ok" } else { "error" };
    counter!("platform_sends_total", "kind" => kind, "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::automation::InteractionKind;
    use crate::rules::{StepKind, Trigger};
    use crate::webhook::{CommentEvent, DirectMessageEvent};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use tokio::time::Instant;
    use uuid::Uuid;
    use zeroize::Zeroizing;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Message(Recipient, OutboundMessage),
        Reply(String, String),
    }

    /// Records calls and fails the call whose index is in `fail_at`.
    struct ScriptedPlatform {
        calls: Mutex<Vec<(Instant, Call)>>,
        fail_at: Vec<usize>,
    }

    impl ScriptedPlatform {
        fn new(fail_at: Vec<usize>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail_at,
            })
        }

        fn push(&self, call: Call) -> Result<(), SendError> {
            let mut calls = self.calls.lock().unwrap();
            let index = calls.len();
            calls.push((Instant::now(), call));
            if self.fail_at.contains(&index) {
                Err(SendError::Http {
                    status: 400,
                    body: "rejected".into(),
                })
            } else {
                Ok(())
            }
        }

        fn calls(&self) -> Vec<(Instant, Call)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PlatformApi for ScriptedPlatform {
        async fn send_message(
            &self,
            _access_token: &str,
            recipient: &Recipient,
            message: &OutboundMessage,
        ) -> Result<(), SendError> {
            self.push(Call::Message(recipient.clone(), message.clone()))
        }

        async fn reply_to_comment(
            &self,
            _access_token: &str,
            comment_id: &str,
            text: &str,
        ) -> Result<(), SendError> {
            self.push(Call::Reply(comment_id.into(), text.into()))
        }

        async fn refresh_credential(
            &self,
            _access_token: &str,
        ) -> Result<crate::platform::RefreshedCredential, SendError> {
            Err(SendError::Network("not scripted".into()))
        }
    }

    fn credential() -> ChannelCredential {
        ChannelCredential {
            channel_id: Uuid::nil(),
            tenant_id: Uuid::nil(),
            access_token: Zeroizing::new("token".into()),
            expires_at: None,
        }
    }

    fn rule(kind: InteractionKind, plan: ResponsePlan, delay_seconds: u32) -> Rule {
        Rule {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            channel_id: Uuid::nil(),
            name: "test".into(),
            interaction_kind: kind,
            trigger: Trigger::MatchAll,
            plan,
            delay_seconds,
            created_at: Utc::now().into(),
        }
    }

    fn dm_event() -> InboundEvent {
        InboundEvent::DirectMessage(DirectMessageEvent {
            sender_id: "user-1".into(),
            recipient_id: "acct".into(),
            message_id: "m-1".into(),
            text: "hello".into(),
            timestamp: Utc::now(),
            raw: serde_json::json!({}),
        })
    }

    fn comment_event() -> InboundEvent {
        InboundEvent::Comment(CommentEvent {
            comment_id: "c-1".into(),
            media_id: Some("media-1".into()),
            commenter_id: "user-2".into(),
            commenter_username: Some("fan".into()),
            text: "price?".into(),
            timestamp: Utc::now(),
            raw: serde_json::json!({}),
        })
    }

    fn step(kind: StepKind, content: &str, delay_seconds: u32) -> SequenceStep {
        SequenceStep {
            kind,
            content: content.into(),
            delay_seconds,
        }
    }

    fn sequence() -> Vec<SequenceStep> {
        vec![
            step(StepKind::Text, "hi", 0),
            step(StepKind::Image, "https://cdn.example.com/a.png", 5),
            step(StepKind::Text, "bye", 10),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn sequence_steps_are_sent_in_order_with_delays() {
        let platform = ScriptedPlatform::new(vec![]);
        let dispatcher = ResponseDispatcher::new(platform.clone());
        let rule = rule(
            InteractionKind::DirectMessage,
            ResponsePlan::DirectMessage(MessagePayload::Sequence(sequence())),
            30,
        );

        let start = Instant::now();
        let outcome = dispatcher.dispatch(&credential(), &rule, &dm_event()).await;

        assert_eq!(outcome.status, DispatchStatus::Sent);
        assert_eq!(outcome.response_text, None);

        let calls = platform.calls();
        assert_eq!(calls.len(), 3);
        // Legacy delay is ignored for sequences; step delays are relative.
        assert_eq!(calls[0].0 - start, Duration::ZERO);
        assert_eq!(calls[1].0 - calls[0].0, Duration::from_secs(5));
        assert_eq!(calls[2].0 - calls[1].0, Duration::from_secs(10));

        let recipient = Recipient::User("user-1".into());
        assert_eq!(
            calls[1].1,
            Call::Message(
                recipient,
                OutboundMessage::Attachment {
                    kind: StepKind::Image,
                    url: "https://cdn.example.com/a.png".into()
                }
            )
        );
    }

    #[tokio::test(start_paused = true)]
    async fn first_failed_step_aborts_the_rest() {
        let platform = ScriptedPlatform::new(vec![1]);
        let dispatcher = ResponseDispatcher::new(platform.clone());
        let rule = rule(
            InteractionKind::DirectMessage,
            ResponsePlan::DirectMessage(MessagePayload::Sequence(sequence())),
            0,
        );

        let outcome = dispatcher.dispatch(&credential(), &rule, &dm_event()).await;

        assert_eq!(outcome.status, DispatchStatus::Failed);
        assert_eq!(platform.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn legacy_delay_applies_once_to_text_plans() {
        let platform = ScriptedPlatform::new(vec![]);
        let dispatcher = ResponseDispatcher::new(platform.clone());
        let rule = rule(
            InteractionKind::DirectMessage,
            ResponsePlan::DirectMessage(MessagePayload::Text("thanks".into())),
            7,
        );

        let start = Instant::now();
        let outcome = dispatcher.dispatch(&credential(), &rule, &dm_event()).await;

        assert_eq!(outcome.status, DispatchStatus::Sent);
        assert_eq!(outcome.response_text.as_deref(), Some("thanks"));
        let calls = platform.calls();
        assert_eq!(calls[0].0 - start, Duration::from_secs(7));
        assert_eq!(
            calls[0].1,
            Call::Message(
                Recipient::User("user-1".into()),
                OutboundMessage::Text("thanks".into())
            )
        );
    }

    #[tokio::test]
    async fn reply_in_place_targets_the_comment() {
        let platform = ScriptedPlatform::new(vec![]);
        let dispatcher = ResponseDispatcher::new(platform.clone());
        let rule = rule(
            InteractionKind::Comment,
            ResponsePlan::ReplyInPlace {
                text: "Check your DMs".into(),
            },
            0,
        );

        let outcome = dispatcher
            .dispatch(&credential(), &rule, &comment_event())
            .await;

        assert_eq!(outcome.status, DispatchStatus::Sent);
        assert_eq!(
            platform.calls()[0].1,
            Call::Reply("c-1".into(), "Check your DMs".into())
        );
    }

    #[tokio::test]
    async fn dual_plan_addresses_message_by_comment_id() {
        let platform = ScriptedPlatform::new(vec![]);
        let dispatcher = ResponseDispatcher::new(platform.clone());
        let rule = rule(
            InteractionKind::Comment,
            ResponsePlan::ReplyAndDirectMessage {
                reply: "Sent you a DM".into(),
                message: MessagePayload::Text("Here is the link".into()),
            },
            0,
        );

        let outcome = dispatcher
            .dispatch(&credential(), &rule, &comment_event())
            .await;

        assert_eq!(outcome.status, DispatchStatus::Sent);
        let calls = platform.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, Call::Reply("c-1".into(), "Sent you a DM".into()));
        assert_eq!(
            calls[1].1,
            Call::Message(
                Recipient::Comment("c-1".into()),
                OutboundMessage::Text("Here is the link".into())
            )
        );
    }

    #[tokio::test]
    async fn failed_reply_skips_the_direct_message() {
        let platform = ScriptedPlatform::new(vec![0]);
        let dispatcher = ResponseDispatcher::new(platform.clone());
        let rule = rule(
            InteractionKind::Comment,
            ResponsePlan::ReplyAndDirectMessage {
                reply: "Sent you a DM".into(),
                message: MessagePayload::Text("link".into()),
            },
            0,
        );

        let outcome = dispatcher
            .dispatch(&credential(), &rule, &comment_event())
            .await;

        assert_eq!(outcome.status, DispatchStatus::Failed);
        assert_eq!(platform.calls().len(), 1);
    }

    #[tokio::test]
    async fn in_place_reply_on_a_direct_message_fails() {
        let platform = ScriptedPlatform::new(vec![]);
        let dispatcher = ResponseDispatcher::new(platform.clone());
        let rule = rule(
            InteractionKind::DirectMessage,
            ResponsePlan::ReplyInPlace { text: "x".into() },
            0,
        );

        let outcome = dispatcher.dispatch(&credential(), &rule, &dm_event()).await;

        assert_eq!(outcome.status, DispatchStatus::Failed);
        assert!(platform.calls().is_empty());
    }
}
