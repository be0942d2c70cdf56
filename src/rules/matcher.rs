//! Rule selection: at most one automation fires per inbound event.

use anyhow::Result;
use uuid::Uuid;

use super::Rule;
use crate::models::automation::InteractionKind;
use crate::repositories::AutomationRepository;

/// Returns the first rule of `kind` whose trigger matches `text`.
///
/// `rules` must already be in store order (newest first), which makes the
/// most recently created matching rule win.
pub fn select_rule<'a>(rules: &'a [Rule], kind: InteractionKind, text: &str) -> Option<&'a Rule> {
    let folded = text.to_lowercase();
    rules
        .iter()
        .filter(|rule| rule.interaction_kind == kind)
        .find(|rule| rule.trigger.matches_folded(&folded))
}

/// Matcher backed by the automation store
#[derive(Debug, Clone)]
pub struct RuleMatcher {
    store: AutomationRepository,
}

impl RuleMatcher {
    pub fn new(store: AutomationRepository) -> Self {
        Self { store }
    }

    pub async fn find_match(
        &self,
        channel_id: Uuid,
        kind: InteractionKind,
        text: &str,
    ) -> Result<Option<Rule>> {
        let rules = self.store.active_rules_for(channel_id).await?;
        let selected = select_rule(&rules, kind, text).cloned();

        tracing::debug!(
            channel_id = %channel_id,
            interaction_kind = kind.as_str(),
            candidates = rules.len(),
            matched = selected.as_ref().map(|r| r.id.to_string()).as_deref(),
            "Rule selection complete"
        );

        Ok(selected)
    }
}
