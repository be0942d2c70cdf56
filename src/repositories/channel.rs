//! Channel directory
//!
//! Resolves webhook routing keys to channels and owns the channel lifecycle.
//! Metadata reads never touch the credential column; the decrypted token is
//! only produced by the explicit [`ChannelRepository::credential`] read.

use std::fmt;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, FromQueryResult, QueryFilter,
    QueryOrder, QuerySelect, Select, Set, TransactionTrait,
};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::{CryptoKey, decrypt_channel_token, encrypt_channel_token};
use crate::error::is_unique_violation;
use crate::models::channel::{self, ChannelStatus, Entity as Channel};
use crate::models::channel_routing_id::{self, Entity as ChannelRoutingId};

/// Channel metadata without credential material
#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult)]
pub struct ChannelSummary {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub external_account_id: Option<String>,
    pub display_name: Option<String>,
    pub status: ChannelStatus,
    pub token_expires_at: Option<DateTimeWithTimeZone>,
}

/// Decrypted access token for one channel
#[derive(Clone)]
pub struct ChannelCredential {
    pub channel_id: Uuid,
    pub tenant_id: Uuid,
    pub access_token: Zeroizing<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for ChannelCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelCredential")
            .field("channel_id", &self.channel_id)
            .field("tenant_id", &self.tenant_id)
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Fields accepted when registering a channel
#[derive(Debug, Clone, Default)]
pub struct NewChannel {
    pub display_name: Option<String>,
    pub external_account_id: Option<String>,
    pub routing_ids: Vec<String>,
}

/// Routing key already bound to another channel
#[derive(Debug, thiserror::Error)]
#[error("routing identifier '{0}' is already in use")]
pub struct RoutingIdInUse(pub String);

#[derive(Debug, Clone)]
pub struct ChannelRepository {
    pub db: Arc<DatabaseConnection>,
    pub crypto_key: CryptoKey,
}

impl ChannelRepository {
    pub fn new(db: Arc<DatabaseConnection>, crypto_key: CryptoKey) -> Self {
        Self { db, crypto_key }
    }

    /// Metadata projection; the credential column is never selected.
    fn summaries() -> Select<Channel> {
        Channel::find()
            .select_only()
            .columns([
                channel::Column::Id,
                channel::Column::TenantId,
                channel::Column::ExternalAccountId,
                channel::Column::DisplayName,
                channel::Column::Status,
                channel::Column::TokenExpiresAt,
            ])
    }

    /// Resolves a routing key: primary external account id first, then the
    /// alternate identifiers.
    pub async fn resolve(&self, routing_key: &str) -> Result<Option<ChannelSummary>> {
        let primary = Self::summaries()
            .filter(channel::Column::ExternalAccountId.eq(routing_key))
            .into_model::<ChannelSummary>()
            .one(&*self.db)
            .await?;

        if primary.is_some() {
            return Ok(primary);
        }

        let Some(alternate) = ChannelRoutingId::find_by_id(routing_key.to_string())
            .one(&*self.db)
            .await?
        else {
            return Ok(None);
        };

        self.summary(alternate.channel_id).await
    }

    pub async fn summary(&self, channel_id: Uuid) -> Result<Option<ChannelSummary>> {
        Ok(Self::summaries()
            .filter(channel::Column::Id.eq(channel_id))
            .into_model::<ChannelSummary>()
            .one(&*self.db)
            .await?)
    }

    /// Reads and decrypts the channel's access token.
    pub async fn credential(&self, channel_id: Uuid) -> Result<Option<ChannelCredential>> {
        let Some(model) = Channel::find_by_id(channel_id).one(&*self.db).await? else {
            return Ok(None);
        };
        let Some(ciphertext) = model.access_token_ciphertext.as_deref() else {
            return Ok(None);
        };

        let access_token =
            decrypt_channel_token(&self.crypto_key, model.tenant_id, model.id, ciphertext)
                .map_err(|e| {
                    tracing::error!(channel_id = %model.id, "Channel credential decryption failed");
                    anyhow!("Credential decryption failed: {}", e)
                })?;

        Ok(Some(ChannelCredential {
            channel_id: model.id,
            tenant_id: model.tenant_id,
            access_token,
            expires_at: model.token_expires_at.map(|ts| ts.with_timezone(&Utc)),
        }))
    }

    /// True when `key` already routes to some channel, primary or alternate.
    pub async fn routing_key_in_use(&self, key: &str, except_channel: Option<Uuid>) -> Result<bool> {
        routing_key_in_use(&*self.db, key, except_channel).await
    }

    /// Registers a channel in status `created`.
    pub async fn create(&self, tenant_id: Uuid, new: NewChannel) -> Result<channel::Model> {
        let mut keys: Vec<&str> = new.routing_ids.iter().map(String::as_str).collect();
        if let Some(ref primary) = new.external_account_id {
            keys.push(primary);
        }

        let txn = self.db.begin().await?;
        for (index, key) in keys.iter().enumerate() {
            if keys[..index].contains(key) || routing_key_in_use(&txn, key, None).await? {
                return Err(RoutingIdInUse(key.to_string()).into());
            }
        }

        let id = Uuid::new_v4();
        let now: DateTimeWithTimeZone = Utc::now().into();

        channel::ActiveModel {
            id: Set(id),
            tenant_id: Set(tenant_id),
            external_account_id: Set(new.external_account_id.clone()),
            display_name: Set(new.display_name.clone()),
            access_token_ciphertext: Set(None),
            token_expires_at: Set(None),
            status: Set(ChannelStatus::Created),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        for routing_id in &new.routing_ids {
            insert_routing_id(&txn, id, routing_id).await?;
        }

        let created = Channel::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| anyhow!("channel not persisted"))?;
        txn.commit().await?;

        tracing::info!(channel_id = %id, tenant_id = %tenant_id, "Channel created");
        Ok(created)
    }

    /// Adds an alternate routing identifier to an existing channel.
    pub async fn add_routing_id(&self, channel_id: Uuid, routing_id: &str) -> Result<()> {
        let txn = self.db.begin().await?;
        if routing_key_in_use(&txn, routing_id, None).await? {
            return Err(RoutingIdInUse(routing_id.to_string()).into());
        }
        insert_routing_id(&txn, channel_id, routing_id).await?;
        txn.commit().await?;
        Ok(())
    }

    pub async fn routing_ids_for(&self, channel_id: Uuid) -> Result<Vec<String>> {
        Ok(ChannelRoutingId::find()
            .filter(channel_routing_id::Column::ChannelId.eq(channel_id))
            .order_by_asc(channel_routing_id::Column::RoutingId)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|row| row.routing_id)
            .collect())
    }

    /// Completes authorization: stores the encrypted token and marks the
    /// channel `connected`.
    pub async fn attach_credential(
        &self,
        channel_id: Uuid,
        external_account_id: &str,
        access_token: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<channel::Model> {
        let existing = Channel::find_by_id(channel_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("Channel '{}' not found", channel_id))?;

        if self
            .routing_key_in_use(external_account_id, Some(channel_id))
            .await?
        {
            return Err(RoutingIdInUse(external_account_id.to_string()).into());
        }

        let ciphertext = encrypt_channel_token(
            &self.crypto_key,
            existing.tenant_id,
            existing.id,
            access_token,
        )
        .map_err(|e| anyhow!("Token encryption failed: {}", e))?;

        let mut model: channel::ActiveModel = existing.into();
        model.external_account_id = Set(Some(external_account_id.to_string()));
        model.access_token_ciphertext = Set(Some(ciphertext));
        model.token_expires_at = Set(expires_at.map(Into::into));
        model.status = Set(ChannelStatus::Connected);
        model.updated_at = Set(Utc::now().into());

        let updated = model.update(&*self.db).await?;
        tracing::info!(channel_id = %channel_id, "Channel credential attached");
        Ok(updated)
    }

    /// Replaces the stored token after a successful refresh.
    pub async fn update_credential(
        &self,
        channel_id: Uuid,
        access_token: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<channel::Model> {
        let existing = Channel::find_by_id(channel_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("Channel '{}' not found", channel_id))?;

        let ciphertext = encrypt_channel_token(
            &self.crypto_key,
            existing.tenant_id,
            existing.id,
            access_token,
        )
        .map_err(|e| anyhow!("Token encryption failed: {}", e))?;

        let mut model: channel::ActiveModel = existing.into();
        model.access_token_ciphertext = Set(Some(ciphertext));
        model.token_expires_at = Set(expires_at.map(Into::into));
        model.status = Set(ChannelStatus::Connected);
        model.updated_at = Set(Utc::now().into());

        Ok(model.update(&*self.db).await?)
    }

    pub async fn update_status(&self, channel_id: Uuid, status: ChannelStatus) -> Result<()> {
        let result = Channel::update_many()
            .col_expr(channel::Column::Status, Expr::value(status))
            .col_expr(
                channel::Column::UpdatedAt,
                Expr::value(DateTimeWithTimeZone::from(Utc::now())),
            )
            .filter(channel::Column::Id.eq(channel_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(anyhow!("Channel '{}' not found", channel_id));
        }
        Ok(())
    }

    /// Clears the credential and marks the channel `disconnected`; the row is kept.
    pub async fn deauthorize(&self, channel_id: Uuid) -> Result<()> {
        let result = Channel::update_many()
            .col_expr(
                channel::Column::AccessTokenCiphertext,
                Expr::value(Option::<Vec<u8>>::None),
            )
            .col_expr(
                channel::Column::TokenExpiresAt,
                Expr::value(Option::<DateTimeWithTimeZone>::None),
            )
            .col_expr(
                channel::Column::Status,
                Expr::value(ChannelStatus::Disconnected),
            )
            .col_expr(
                channel::Column::UpdatedAt,
                Expr::value(DateTimeWithTimeZone::from(Utc::now())),
            )
            .filter(channel::Column::Id.eq(channel_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(anyhow!("Channel '{}' not found", channel_id));
        }
        tracing::info!(channel_id = %channel_id, "Channel deauthorized");
        Ok(())
    }

    pub async fn find_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<channel::Model>> {
        Ok(Channel::find_by_id(id)
            .filter(channel::Column::TenantId.eq(tenant_id))
            .one(&*self.db)
            .await?)
    }

    pub async fn list_by_tenant(&self, tenant_id: Uuid) -> Result<Vec<channel::Model>> {
        Ok(Channel::find()
            .filter(channel::Column::TenantId.eq(tenant_id))
            .order_by_asc(channel::Column::CreatedAt)
            .order_by_asc(channel::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Deletes a channel and its routing identifiers. Returns false when the
    /// channel does not exist for the tenant.
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<bool> {
        let txn = self.db.begin().await?;
        let owned = Channel::find_by_id(id)
            .filter(channel::Column::TenantId.eq(tenant_id))
            .one(&txn)
            .await?;
        if owned.is_none() {
            return Ok(false);
        }

        ChannelRoutingId::delete_many()
            .filter(channel_routing_id::Column::ChannelId.eq(id))
            .exec(&txn)
            .await?;

        let result = Channel::delete_by_id(id)
            .filter(channel::Column::TenantId.eq(tenant_id))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        Ok(result.rows_affected > 0)
    }

    /// Connected channels whose token expires within `lead`.
    pub async fn due_for_refresh(&self, lead: Duration, limit: u64) -> Result<Vec<channel::Model>> {
        let threshold: DateTimeWithTimeZone = (Utc::now() + lead).into();

        Ok(Channel::find()
            .filter(channel::Column::Status.eq(ChannelStatus::Connected))
            .filter(channel::Column::AccessTokenCiphertext.is_not_null())
            .filter(channel::Column::TokenExpiresAt.is_not_null())
            .filter(channel::Column::TokenExpiresAt.lte(threshold))
            .order_by_asc(channel::Column::TokenExpiresAt)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }
}

/// True when `key` is a primary or alternate routing id of a channel other than `except_channel`.
async fn routing_key_in_use<C: ConnectionTrait>(
    conn: &C,
    key: &str,
    except_channel: Option<Uuid>,
) -> Result<bool> {
    let mut primary = Channel::find().filter(channel::Column::ExternalAccountId.eq(key));
    if let Some(id) = except_channel {
        primary = primary.filter(channel::Column::Id.ne(id));
    }
    if primary.one(conn).await?.is_some() {
        return Ok(true);
    }

    let alternate = ChannelRoutingId::find_by_id(key.to_string()).one(conn).await?;
    Ok(alternate.is_some_and(|row| Some(row.channel_id) != except_channel))
}

async fn insert_routing_id<C: ConnectionTrait>(
    conn: &C,
    channel_id: Uuid,
    routing_id: &str,
) -> Result<()> {
    let inserted = channel_routing_id::ActiveModel {
        routing_id: Set(routing_id.to_string()),
        channel_id: Set(channel_id),
        created_at: Set(Utc::now().into()),
    }
    .insert(conn)
    .await;

    match inserted {
        Ok(_) => Ok(()),
        // Lost a race with a concurrent registration of the same id
        Err(err) if is_unique_violation(&err) => {
            Err(RoutingIdInUse(routing_id.to_string()).into())
        }
        Err(err) => Err(err.into()),
    }
}
