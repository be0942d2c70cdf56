//! Write-time validation of automation definitions.
//!
//! [`validate`] is the only way to obtain a [`ValidatedAutomation`]; it checks
//! every rule and reports all violations at once rather than stopping at the
//! first.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use utoipa::ToSchema;

use super::plan::{
    MAX_SEQUENCE_STEPS, MessagePayload, PayloadRule, ResponsePlan, SequenceStep, StepKind,
    payload_rule,
};
use super::Trigger;
use crate::models::automation::{self, InteractionKind, ResponseKind, TriggerKind};

/// Longest accepted per-step or legacy delay (one day)
pub const MAX_DELAY_SECONDS: i64 = 86_400;

const MAX_NAME_CHARS: usize = 200;

/// A sequence step as submitted by a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SequenceStepInput {
    pub kind: StepKind,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub delay_seconds: i64,
}

impl From<&SequenceStep> for SequenceStepInput {
    fn from(step: &SequenceStep) -> Self {
        Self {
            kind: step.kind,
            content: step.content.clone(),
            delay_seconds: i64::from(step.delay_seconds),
        }
    }
}

/// Unvalidated automation definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AutomationDraft {
    pub name: String,
    pub interaction_kind: InteractionKind,
    pub trigger_kind: TriggerKind,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub response_kind: ResponseKind,
    #[serde(default)]
    pub response_text: Option<String>,
    #[serde(default)]
    pub response_sequence: Option<Vec<SequenceStepInput>>,
    /// Legacy delay before text-only sends
    #[serde(default)]
    pub delay_seconds: i64,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
}

fn default_is_active() -> bool {
    true
}

impl AutomationDraft {
    /// Rebuilds the draft a stored row was validated from.
    pub fn from_model(model: &automation::Model) -> Self {
        let keywords: Vec<String> =
            serde_json::from_value(model.keywords.clone()).unwrap_or_default();

        let response_sequence = model.response_sequence.as_ref().map(|raw| {
            serde_json::from_value::<Vec<SequenceStep>>(raw.clone())
                .map(|steps| steps.iter().map(SequenceStepInput::from).collect())
                .unwrap_or_default()
        });

        Self {
            name: model.name.clone(),
            interaction_kind: model.interaction_kind,
            trigger_kind: model.trigger_kind,
            keywords,
            response_kind: model.response_kind,
            response_text: model.response_text.clone(),
            response_sequence,
            delay_seconds: i64::from(model.delay_seconds),
            is_active: model.is_active,
        }
    }
}

/// One broken rule, addressed by the offending field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid automation: {}", join_violations(.violations))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl ValidationError {
    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(Violation::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// An automation definition that satisfies every write-time invariant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAutomation {
    pub name: String,
    pub interaction_kind: InteractionKind,
    pub trigger: Trigger,
    pub response_kind: ResponseKind,
    pub plan: ResponsePlan,
    pub delay_seconds: u32,
    pub is_active: bool,
}

/// Checks a draft against the decision table and the payload rules.
pub fn validate(draft: &AutomationDraft) -> Result<ValidatedAutomation, ValidationError> {
    let mut violations = Vec::new();

    let name = draft.name.trim();
    if name.is_empty() {
        violations.push(Violation::new("name", "must not be blank"));
    } else if name.chars().count() > MAX_NAME_CHARS {
        violations.push(Violation::new(
            "name",
            format!("must be at most {} characters", MAX_NAME_CHARS),
        ));
    }

    let trigger = match draft.trigger_kind {
        TriggerKind::MatchAll => Trigger::MatchAll,
        TriggerKind::Keywords => {
            let keywords: Vec<String> = draft
                .keywords
                .iter()
                .map(|k| k.trim())
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
            if keywords.is_empty() {
                violations.push(Violation::new(
                    "keywords",
                    "keyword trigger requires at least one non-blank keyword",
                ));
            }
            Trigger::Keywords(keywords)
        }
    };

    let delay_seconds = checked_delay("delay_seconds", draft.delay_seconds, &mut violations);

    let text = draft
        .response_text
        .as_ref()
        .filter(|t| !t.trim().is_empty())
        .cloned();
    let sequence = draft
        .response_sequence
        .as_deref()
        .map(|steps| validate_steps(steps, &mut violations));

    let plan = build_plan(draft, text, sequence, &mut violations);

    match plan {
        Some(plan) if violations.is_empty() => Ok(ValidatedAutomation {
            name: name.to_string(),
            interaction_kind: draft.interaction_kind,
            trigger,
            response_kind: draft.response_kind,
            plan,
            delay_seconds,
            is_active: draft.is_active,
        }),
        _ => Err(ValidationError { violations }),
    }
}

fn build_plan(
    draft: &AutomationDraft,
    text: Option<String>,
    sequence: Option<Vec<SequenceStep>>,
    violations: &mut Vec<Violation>,
) -> Option<ResponsePlan> {
    match payload_rule(draft.interaction_kind, draft.response_kind) {
        PayloadRule::Forbidden => {
            violations.push(Violation::new(
                "response_kind",
                format!(
                    "{} is not available for {} automations",
                    draft.response_kind.as_str(),
                    draft.interaction_kind.as_str()
                ),
            ));
            None
        }
        PayloadRule::TextOnly => {
            if draft.response_sequence.is_some() {
                violations.push(Violation::new(
                    "response_sequence",
                    "in-place comment replies cannot carry a response sequence",
                ));
            }
            match text {
                Some(text) => Some(ResponsePlan::ReplyInPlace { text }),
                None => {
                    violations.push(Violation::new(
                        "response_text",
                        "required for in-place replies",
                    ));
                    None
                }
            }
        }
        PayloadRule::TextOrSequence => match (text, sequence) {
            (Some(_), Some(_)) => {
                violations.push(Violation::new(
                    "response_text",
                    "provide either response_text or response_sequence, not both",
                ));
                None
            }
            (Some(text), None) => Some(ResponsePlan::DirectMessage(MessagePayload::Text(text))),
            (None, Some(steps)) => Some(ResponsePlan::DirectMessage(MessagePayload::Sequence(
                steps,
            ))),
            (None, None) => {
                violations.push(Violation::new(
                    "response_text",
                    "a response text or a response sequence is required",
                ));
                None
            }
        },
        PayloadRule::ReplyTextWithMessage => match text {
            Some(reply) => {
                let message = match sequence {
                    Some(steps) => MessagePayload::Sequence(steps),
                    None => MessagePayload::Text(reply.clone()),
                };
                Some(ResponsePlan::ReplyAndDirectMessage { reply, message })
            }
            None => {
                violations.push(Violation::new(
                    "response_text",
                    "required for the in-place part of the reply",
                ));
                None
            }
        },
    }
}

fn validate_steps(steps: &[SequenceStepInput], violations: &mut Vec<Violation>) -> Vec<SequenceStep> {
    if steps.is_empty() {
        violations.push(Violation::new(
            "response_sequence",
            "must contain at least one step",
        ));
    } else if steps.len() > MAX_SEQUENCE_STEPS {
        violations.push(Violation::new(
            "response_sequence",
            format!(
                "at most {} steps are allowed, got {}",
                MAX_SEQUENCE_STEPS,
                steps.len()
            ),
        ));
    }

    steps
        .iter()
        .enumerate()
        .map(|(index, step)| {
            let content_field = format!("response_sequence[{}].content", index);
            let trimmed = step.content.trim();

            if trimmed.is_empty() {
                violations.push(Violation::new(content_field, "must not be empty"));
            } else if step.kind.is_media()
                && let Err(message) = check_media_url(step.kind, trimmed)
            {
                violations.push(Violation::new(content_field, message));
            }

            let delay_seconds = checked_delay(
                &format!("response_sequence[{}].delay_seconds", index),
                step.delay_seconds,
                violations,
            );

            SequenceStep {
                kind: step.kind,
                content: if step.kind.is_media() {
                    trimmed.to_string()
                } else {
                    step.content.clone()
                },
                delay_seconds,
            }
        })
        .collect()
}

fn checked_delay(field: &str, value: i64, violations: &mut Vec<Violation>) -> u32 {
    if value < 0 {
        violations.push(Violation::new(field, "must be zero or a positive number of seconds"));
        return 0;
    }
    if value > MAX_DELAY_SECONDS {
        violations.push(Violation::new(
            field,
            format!("must be at most {} seconds", MAX_DELAY_SECONDS),
        ));
        return 0;
    }
    u32::try_from(value).unwrap_or(0)
}

/// Media steps must point at an HTTPS URL whose last path segment carries an
/// extension from the step kind's allow-list.
fn check_media_url(kind: StepKind, raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|_| "must be an absolute HTTPS URL".to_string())?;

    if url.scheme() != "https" {
        return Err("media URLs must use https".to_string());
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err("media URL is missing a host".to_string());
    }

    let extension = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|segment| segment.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match extension {
        Some(ext) if kind.allowed_extensions().contains(&ext.as_str()) => Ok(()),
        _ => Err(format!(
            "{} URLs must end in one of: {}",
            kind.as_str(),
            kind.allowed_extensions().join(", ")
        )),
    }
}
