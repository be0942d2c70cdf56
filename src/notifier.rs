//! # Live Update Notifier
//!
//! Best-effort push of recorded interactions to a dashboard endpoint. The
//! pipeline hands updates to a bounded channel and never waits; a background
//! worker posts them with a limited retry budget. Updates that exhaust the
//! budget are parked in a bounded pending queue and flushed after the next
//! successful delivery; when that queue is full the oldest entry is dropped.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::NotifierConfig;
use crate::models::automation::InteractionKind;
use crate::models::interaction_report::ReportStatus;

const BASE_BACKOFF_MS: u64 = 200;
const MAX_BACKOFF_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveUpdate {
    pub tenant_id: Uuid,
    pub channel_id: Uuid,
    pub report_id: Uuid,
    pub automation_id: Option<Uuid>,
    pub interaction_kind: InteractionKind,
    pub status: ReportStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Sending side held by the pipeline
#[derive(Debug, Clone, Default)]
pub struct NotifierHandle {
    tx: Option<mpsc::Sender<LiveUpdate>>,
}

impl NotifierHandle {
    /// A handle that discards every update.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Queues an update without waiting; drops it when the buffer is full.
    pub fn notify(&self, update: LiveUpdate) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(error) = tx.try_send(update) {
            counter!("notifier_dropped_total", "reason" => "buffer_full").increment(1);
            debug!(error = %error, "Live update dropped");
        }
    }
}

/// Background worker delivering queued updates
pub struct NotifierWorker {
    rx: mpsc::Receiver<LiveUpdate>,
    http: reqwest::Client,
    url: String,
    max_retries: u32,
    pending: VecDeque<LiveUpdate>,
    pending_capacity: usize,
}

/// Builds the handle and, when a URL is configured, its worker.
pub fn notifier(config: &NotifierConfig) -> Result<(NotifierHandle, Option<NotifierWorker>), reqwest::Error> {
    let Some(url) = config.url.clone() else {
        info!("Live update notifier disabled");
        return Ok((NotifierHandle::disabled(), None));
    };

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .build()?;
    let (tx, rx) = mpsc::channel(config.queue_capacity);

    let worker = NotifierWorker {
        rx,
        http,
        url,
        max_retries: config.max_retries,
        pending: VecDeque::new(),
        pending_capacity: config.queue_capacity,
    };

    Ok((NotifierHandle { tx: Some(tx) }, Some(worker)))
}

impl NotifierWorker {
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(url = %self.url, "Live update notifier started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(pending = self.pending.len(), "Live update notifier stopping");
                    break;
                }
                next = self.rx.recv() => {
                    let Some(update) = next else { break };
                    self.handle(update).await;
                }
            }
        }
    }

    async fn handle(&mut self, update: LiveUpdate) {
        if self.deliver_with_retries(&update).await {
            self.flush_pending().await;
        } else {
            self.park(update);
        }
    }

    async fn flush_pending(&mut self) {
        while let Some(update) = self.pending.pop_front() {
            if !self.post(&update).await {
                self.pending.push_front(update);
                break;
            }
        }
    }

    fn park(&mut self, update: LiveUpdate) {
        if self.pending.len() >= self.pending_capacity {
            self.pending.pop_front();
            counter!("notifier_dropped_total", "reason" => "pending_full").increment(1);
        }
        self.pending.push_back(update);
    }

    async fn deliver_with_retries(&self, update: &LiveUpdate) -> bool {
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff(attempt)).await;
            }
            if self.post(update).await {
                counter!("notifier_delivered_total").increment(1);
                return true;
            }
        }
        warn!(
            report_id = %update.report_id,
            attempts = self.max_retries + 1,
            "Live update delivery exhausted retries"
        );
        false
    }

    async fn post(&self, update: &LiveUpdate) -> bool {
        match self.http.post(&self.url).json(update).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!(status = response.status().as_u16(), "Live update rejected");
                false
            }
            Err(error) => {
                debug!(error = %error, "Live update request failed");
                false
            }
        }
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn backoff(attempt: u32) -> Duration {
    let exp = BASE_BACKOFF_MS.saturating_mul(1u64 << attempt.min(16));
    Duration::from_millis(exp.min(MAX_BACKOFF_MS))
}
