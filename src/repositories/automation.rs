//! # Automation Repository
//!
//! Persistence for automations. Writes only accept a [`ValidatedAutomation`];
//! reads for the pipeline convert rows back into [`Rule`]s.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::json;
use uuid::Uuid;

use crate::models::automation::{self, Entity as Automation, Model, TriggerKind};
use crate::rules::{Rule, Trigger, ValidatedAutomation};

#[derive(Debug, Clone)]
pub struct AutomationRepository {
    pub db: Arc<DatabaseConnection>,
}

/// Column values derived from a validated automation
struct StoredShape {
    trigger_kind: TriggerKind,
    keywords: serde_json::Value,
    response_text: Option<String>,
    response_sequence: Option<serde_json::Value>,
}

impl StoredShape {
    fn from_validated(automation: &ValidatedAutomation) -> Result<Self> {
        let trigger_kind = match automation.trigger {
            Trigger::MatchAll => TriggerKind::MatchAll,
            Trigger::Keywords(_) => TriggerKind::Keywords,
        };
        let response_sequence = automation
            .plan
            .sequence()
            .map(serde_json::to_value)
            .transpose()?;

        Ok(Self {
            trigger_kind,
            keywords: json!(automation.trigger.keywords()),
            response_text: automation.plan.stored_text().map(str::to_string),
            response_sequence,
        })
    }
}

impl AutomationRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        tenant_id: Uuid,
        channel_id: Uuid,
        automation: &ValidatedAutomation,
    ) -> Result<Model> {
        let shape = StoredShape::from_validated(automation)?;
        let now: DateTimeWithTimeZone = Utc::now().into();
        let id = Uuid::new_v4();

        let model = automation::ActiveModel {
            id: Set(id),
            tenant_id: Set(tenant_id),
            channel_id: Set(channel_id),
            name: Set(automation.name.clone()),
            interaction_kind: Set(automation.interaction_kind),
            trigger_kind: Set(shape.trigger_kind),
            keywords: Set(shape.keywords),
            response_kind: Set(automation.response_kind),
            response_text: Set(shape.response_text),
            response_sequence: Set(shape.response_sequence),
            delay_seconds: Set(automation.delay_seconds as i32),
            is_active: Set(automation.is_active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        tracing::info!(
            automation_id = %id,
            channel_id = %channel_id,
            interaction_kind = automation.interaction_kind.as_str(),
            response_kind = automation.response_kind.as_str(),
            "Automation created"
        );

        Ok(model)
    }

    /// Replaces every definition column; identity and creation time are kept.
    pub async fn update(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        automation: &ValidatedAutomation,
    ) -> Result<Model> {
        let existing = self
            .find_by_id(tenant_id, id)
            .await?
            .ok_or_else(|| anyhow!("Automation with id '{}' not found", id))?;
        let shape = StoredShape::from_validated(automation)?;

        let mut model: automation::ActiveModel = existing.into();
        model.name = Set(automation.name.clone());
        model.interaction_kind = Set(automation.interaction_kind);
        model.trigger_kind = Set(shape.trigger_kind);
        model.keywords = Set(shape.keywords);
        model.response_kind = Set(automation.response_kind);
        model.response_text = Set(shape.response_text);
        model.response_sequence = Set(shape.response_sequence);
        model.delay_seconds = Set(automation.delay_seconds as i32);
        model.is_active = Set(automation.is_active);
        model.updated_at = Set(Utc::now().into());

        Ok(model.update(&*self.db).await?)
    }

    pub async fn find_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Model>> {
        Ok(Automation::find_by_id(id)
            .filter(automation::Column::TenantId.eq(tenant_id))
            .one(&*self.db)
            .await?)
    }

    pub async fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        channel_id: Option<Uuid>,
    ) -> Result<Vec<Model>> {
        let mut query = Automation::find().filter(automation::Column::TenantId.eq(tenant_id));
        if let Some(channel_id) = channel_id {
            query = query.filter(automation::Column::ChannelId.eq(channel_id));
        }

        Ok(query
            .order_by_desc(automation::Column::CreatedAt)
            .order_by_desc(automation::Column::Id)
            .all(&*self.db)
            .await?)
    }

    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<bool> {
        let result = Automation::delete_by_id(id)
            .filter(automation::Column::TenantId.eq(tenant_id))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Active automations of a channel, newest first.
    ///
    /// Rows that no longer validate are skipped with a warning so one bad
    /// definition cannot block the rest of the channel.
    pub async fn active_rules_for(&self, channel_id: Uuid) -> Result<Vec<Rule>> {
        let rows = Automation::find()
            .filter(automation::Column::ChannelId.eq(channel_id))
            .filter(automation::Column::IsActive.eq(true))
            .order_by_desc(automation::Column::CreatedAt)
            .order_by_desc(automation::Column::Id)
            .all(&*self.db)
            .await?;

        let rules = rows
            .iter()
            .filter_map(|row| match Rule::try_from(row) {
                Ok(rule) => Some(rule),
                Err(error) => {
                    tracing::warn!(
                        automation_id = %row.id,
                        error = %error,
                        "Skipping automation that fails validation"
                    );
                    None
                }
            })
            .collect();

        Ok(rules)
    }
}
