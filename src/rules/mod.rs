//! # Automation rules
//!
//! Domain view of automations: validated response plans, triggers and the
//! pure selection logic the matcher runs against a channel's active rules.

pub mod matcher;
pub mod plan;
pub mod validation;

use chrono::{DateTime, FixedOffset};
use uuid::Uuid;

use crate::models::automation::{self, InteractionKind};

pub use matcher::{RuleMatcher, select_rule};
pub use plan::{MessagePayload, ResponsePlan, SequenceStep, StepKind};
pub use validation::{
    AutomationDraft, SequenceStepInput, ValidatedAutomation, ValidationError, Violation, validate,
};

/// How an automation decides it applies to an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    MatchAll,
    /// Trimmed, non-blank keywords in their original case
    Keywords(Vec<String>),
}

impl Trigger {
    /// `folded_text` must already be lowercased.
    pub fn matches_folded(&self, folded_text: &str) -> bool {
        match self {
            Trigger::MatchAll => true,
            Trigger::Keywords(keywords) => keywords
                .iter()
                .any(|keyword| folded_text.contains(&keyword.to_lowercase())),
        }
    }

    pub fn keywords(&self) -> &[String] {
        match self {
            Trigger::MatchAll => &[],
            Trigger::Keywords(keywords) => keywords,
        }
    }
}

/// An active automation as the pipeline sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub channel_id: Uuid,
    pub name: String,
    pub interaction_kind: InteractionKind,
    pub trigger: Trigger,
    pub plan: ResponsePlan,
    /// Legacy delay applied before text-only plans
    pub delay_seconds: u32,
    pub created_at: DateTime<FixedOffset>,
}

impl TryFrom<&automation::Model> for Rule {
    type Error = ValidationError;

    fn try_from(model: &automation::Model) -> Result<Self, Self::Error> {
        let validated = validate(&AutomationDraft::from_model(model))?;
        Ok(Self {
            id: model.id,
            tenant_id: model.tenant_id,
            channel_id: model.channel_id,
            name: validated.name,
            interaction_kind: validated.interaction_kind,
            trigger: validated.trigger,
            plan: validated.plan,
            delay_seconds: validated.delay_seconds,
            created_at: model.created_at,
        })
    }
}
