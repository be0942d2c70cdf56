//! # Token Refresh Service
//!
//! Background task that periodically finds connected channels whose
//! long-lived credential is close to expiry and exchanges it for a fresh one.
//! Credentials the platform rejects outright move the channel to `error`.

use std::sync::Arc;

use chrono::Duration;
use metrics::{counter, gauge, histogram};
use rand::Rng;
use tokio::sync::Semaphore;
use tokio::time::{Duration as TokioDuration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::TokenRefreshConfig;
use crate::models::channel::{self, ChannelStatus};
use crate::platform::{PlatformApi, SendError};
use crate::repositories::ChannelRepository;

/// Upper bound on channels examined per tick
const MAX_CHANNELS_PER_TICK: u64 = 500;

/// How a failed refresh should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshErrorClassification {
    /// The credential is dead; the channel is marked `error`
    Permanent,
    /// Retry on a later tick
    Transient,
    RateLimited,
}

/// Maps a platform failure onto a handling strategy.
pub fn classify_refresh_error(error: &SendError) -> RefreshErrorClassification {
    match error {
        SendError::Http { status: 429, .. } => RefreshErrorClassification::RateLimited,
        SendError::Http { status: 401 | 403, .. } => RefreshErrorClassification::Permanent,
        SendError::Http { status: 400, body } => {
            let body = body.to_lowercase();
            if body.contains("oauthexception") || body.contains("invalid") {
                RefreshErrorClassification::Permanent
            } else {
                RefreshErrorClassification::Transient
            }
        }
        _ => RefreshErrorClassification::Transient,
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    pub channels_due: u64,
    pub refreshed: u64,
    pub failed: u64,
    pub marked_error: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelRefresh {
    Refreshed,
    Skipped,
    Failed(RefreshErrorClassification),
}

#[derive(Clone)]
pub struct TokenRefreshService {
    config: TokenRefreshConfig,
    channels: ChannelRepository,
    platform: Arc<dyn PlatformApi>,
}

impl TokenRefreshService {
    pub fn new(
        config: TokenRefreshConfig,
        channels: ChannelRepository,
        platform: Arc<dyn PlatformApi>,
    ) -> Self {
        Self {
            config,
            channels,
            platform,
        }
    }

    /// Run the refresh loop until the shutdown token fires
    #[instrument(skip_all)]
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            tick_seconds = self.config.tick_seconds,
            lead_time_seconds = self.config.lead_time_seconds,
            "Starting token refresh service"
        );
        let tick_interval = TokioDuration::from_secs(self.config.tick_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Token refresh service shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = std::time::Instant::now();
                    if let Err(err) = self.tick().await {
                        error!(error = ?err, "Token refresh tick failed");
                    }
                    histogram!("token_refresh_tick_duration_ms")
                        .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Token refresh service stopped");
    }

    /// One pass over channels due for refresh
    #[instrument(skip_all)]
    pub async fn tick(&self) -> anyhow::Result<TickStats> {
        let lead = Duration::seconds(self.config.lead_time_seconds as i64);
        let due = self
            .channels
            .due_for_refresh(lead, MAX_CHANNELS_PER_TICK)
            .await?;

        let mut stats = TickStats {
            channels_due: due.len() as u64,
            ..TickStats::default()
        };
        gauge!("token_refresh_channels_due").set(stats.channels_due as f64);

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1) as usize));
        let mut handles = Vec::with_capacity(due.len());

        for channel in due {
            let semaphore = semaphore.clone();
            let service = self.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await?;
                service.refresh_with_jitter(channel).await
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(Ok(ChannelRefresh::Refreshed)) => stats.refreshed += 1,
                Ok(Ok(ChannelRefresh::Skipped)) => {}
                Ok(Ok(ChannelRefresh::Failed(classification))) => {
                    stats.failed += 1;
                    if classification == RefreshErrorClassification::Permanent {
                        stats.marked_error += 1;
                    }
                }
                Ok(Err(e)) => {
                    stats.failed += 1;
                    error!(error = ?e, "Channel refresh failed");
                }
                Err(e) => {
                    stats.failed += 1;
                    error!(error = ?e, "Refresh task panicked or was cancelled");
                }
            }
        }

        counter!("token_refresh_success_total").increment(stats.refreshed);
        counter!("token_refresh_failure_total").increment(stats.failed);
        debug!(
            channels_due = stats.channels_due,
            refreshed = stats.refreshed,
            failed = stats.failed,
            marked_error = stats.marked_error,
            "Token refresh tick completed"
        );

        Ok(stats)
    }

    async fn refresh_with_jitter(&self, channel: channel::Model) -> anyhow::Result<ChannelRefresh> {
        let jitter_seconds = self.compute_jitter();
        if jitter_seconds > 0 {
            debug!(
                channel_id = %channel.id,
                jitter_seconds,
                "Applying jitter before token refresh"
            );
            sleep(TokioDuration::from_secs(jitter_seconds)).await;
        }
        self.refresh_channel(channel.id).await
    }

    /// Refreshes one channel's credential.
    #[instrument(skip(self))]
    async fn refresh_channel(&self, channel_id: Uuid) -> anyhow::Result<ChannelRefresh> {
        let Some(credential) = self.channels.credential(channel_id).await? else {
            warn!("Channel has no credential; skipping refresh");
            return Ok(ChannelRefresh::Skipped);
        };

        let started = std::time::Instant::now();
        match self
            .platform
            .refresh_credential(credential.access_token.as_str())
            .await
        {
            Ok(refreshed) => {
                self.channels
                    .update_credential(channel_id, &refreshed.access_token, refreshed.expires_at)
                    .await?;
                histogram!("token_refresh_latency_ms")
                    .record(started.elapsed().as_secs_f64() * 1_000.0);
                info!(expires_at = ?refreshed.expires_at, "Refreshed channel credential");
                Ok(ChannelRefresh::Refreshed)
            }
            Err(error) => {
                let classification = classify_refresh_error(&error);
                match classification {
                    RefreshErrorClassification::Permanent => {
                        error!(error = %error, "Credential rejected; marking channel as error");
                        self.channels
                            .update_status(channel_id, ChannelStatus::Error)
                            .await?;
                        counter!("token_refresh_permanent_failure_total").increment(1);
                    }
                    RefreshErrorClassification::Transient => {
                        warn!(error = %error, "Transient token refresh failure; will retry later");
                        counter!("token_refresh_transient_failure_total").increment(1);
                    }
                    RefreshErrorClassification::RateLimited => {
                        warn!(error = %error, "Rate limited during token refresh");
                        counter!("token_refresh_rate_limited_total").increment(1);
                    }
                }
                Ok(ChannelRefresh::Failed(classification))
            }
        }
    }

    /// Random delay up to `tick_seconds * jitter_factor`
    fn compute_jitter(&self) -> u64 {
        if self.config.jitter_factor <= 0.0 {
            return 0;
        }
        let max_delay_seconds = (self.config.tick_seconds as f64 * self.config.jitter_factor) as u64;
        rand::thread_rng().gen_range(0..=max_delay_seconds)
    }
}
