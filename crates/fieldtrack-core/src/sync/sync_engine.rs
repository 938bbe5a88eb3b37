//! Decides what gets transmitted and keeps failed sends for later.
//!
//! Discrete user actions (Start, Stop, site check-in) are always sent.
//! Background tracking samples pass three filters first: not identical to
//! the last transmitted sample, not a near-copy of a Start that just
//! happened, and not before `nextAllowedSendAt`. Anything that fails to
//! send goes to the [`PendingQueue`] and is retried oldest first on the
//! next tick.

use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::api::{ApiError, EventPayload, SendReceipt};
use crate::capabilities::RemoteApi;
use crate::clock::Clock;
use crate::error::CoreError;
use crate::storage::{keys, read_json, write_json, LocalStore, TrackingConfig};
use crate::sync::sync_queue::PendingQueue;
use crate::sync::types::{FlushReport, SendMarker, SendOutcome, SkipReason};
use crate::tracking::event::{Event, EventKind};
use crate::tracking::event_log::{AppendOutcome, EventLog};

/// Send-rate rules for tracking samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncPolicy {
    /// Minimum spacing between two transmitted tracking samples.
    pub min_send_interval: Duration,
    /// A sample this close in time to the latest Start...
    pub start_guard: Duration,
    /// ...and this close in space is treated as the Start itself.
    pub start_guard_radius_m: f64,
}

impl SyncPolicy {
    pub fn from_config(config: &TrackingConfig) -> Self {
        Self {
            min_send_interval: Duration::seconds(
                i64::try_from(config.min_send_interval_secs).unwrap_or(i64::MAX / 1000),
            ),
            start_guard: Duration::seconds(config.start_guard_secs),
            start_guard_radius_m: config.start_guard_radius_m,
        }
    }
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self::from_config(&TrackingConfig::default())
    }
}

enum TransmitError {
    /// Credentials rejected again after a forced refresh.
    Auth,
    Failed(String),
}

pub struct SyncEngine {
    remote: Arc<dyn RemoteApi>,
    store: Arc<dyn LocalStore>,
    log: Arc<EventLog>,
    queue: PendingQueue,
    clock: Arc<dyn Clock>,
    policy: SyncPolicy,
    /// Serializes transmissions within this process.
    sending: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        remote: Arc<dyn RemoteApi>,
        store: Arc<dyn LocalStore>,
        log: Arc<EventLog>,
        clock: Arc<dyn Clock>,
        policy: SyncPolicy,
    ) -> Self {
        Self {
            remote,
            queue: PendingQueue::new(store.clone()),
            store,
            log,
            clock,
            policy,
            sending: Mutex::new(()),
        }
    }

    pub fn event_log(&self) -> &Arc<EventLog> {
        &self.log
    }

    pub fn pending(&self) -> &PendingQueue {
        &self.queue
    }

    /// Append to the ledger, then submit if the event was new.
    pub async fn record(&self, event: Event) -> Result<SendOutcome, CoreError> {
        match self.log.append(event.clone()).await? {
            AppendOutcome::Inserted => self.submit(&event).await,
            AppendOutcome::DuplicateSkipped => Ok(SendOutcome::Skipped(SkipReason::AlreadyRecorded)),
        }
    }

    /// Periodic invocation: retry the backlog, then handle the new sample.
    ///
    /// Backlog failures are logged and never prevent the new sample from
    /// being evaluated.
    pub async fn process_tick(&self, sample: Event) -> Result<SendOutcome, CoreError> {
        match self.flush_pending().await {
            Ok(report) if report.sent > 0 || report.still_pending > 0 => {
                tracing::info!(sent = report.sent, still_pending = report.still_pending, "pending events flushed");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "pending flush failed"),
        }
        self.record(sample).await
    }

    /// Skip reason for `event`, or `None` if it may be sent now.
    pub async fn check_eligibility(&self, event: &Event) -> Result<Option<SkipReason>, CoreError> {
        if event.kind.is_user_initiated() {
            return Ok(None);
        }

        if let Some(marker) = self.last_sent(&event.employee_id).await? {
            if marker.matches(event) {
                return Ok(Some(SkipReason::DuplicateOfLastSent));
            }
        }

        if let Some(start) = self.log.latest_for(EventKind::Start, &event.employee_id).await {
            let gap = (event.timestamp - start.timestamp).abs();
            let distance = event.position().distance_m(&start.position());
            if gap <= self.policy.start_guard && distance <= self.policy.start_guard_radius_m {
                return Ok(Some(SkipReason::StartGuardWindow));
            }
        }

        if let Some(next_allowed) = self.next_allowed_send(&event.employee_id).await? {
            if self.clock.now_utc() < next_allowed {
                return Ok(Some(SkipReason::RateLimited));
            }
        }

        Ok(None)
    }

    /// Send `event` if eligible; queue it on failure.
    pub async fn submit(&self, event: &Event) -> Result<SendOutcome, CoreError> {
        let _sending = self.sending.lock().await;

        if let Some(reason) = self.check_eligibility(event).await? {
            tracing::debug!(kind = %event.kind, ts = %event.timestamp_string(), %reason, "event not sent");
            return Ok(SendOutcome::Skipped(reason));
        }

        let mut saved = false;
        match self.transmit(event, &mut saved).await {
            Ok(()) => {
                self.mark_sent(event, true).await;
                tracing::info!(kind = %event.kind, ts = %event.timestamp_string(), "event sent");
                Ok(SendOutcome::Sent)
            }
            Err(TransmitError::Auth) => {
                self.requeue(event, "unauthorized", saved).await?;
                Err(CoreError::AuthExpired)
            }
            Err(TransmitError::Failed(message)) => {
                tracing::warn!(kind = %event.kind, error = %message, saved, "send failed");
                self.requeue(event, &message, saved).await?;
                Ok(SendOutcome::Queued(message))
            }
        }
    }

    /// Retry queued events oldest first.
    ///
    /// Stops early with [`CoreError::AuthExpired`] when credentials are
    /// refused; the remaining entries stay queued.
    pub async fn flush_pending(&self) -> Result<FlushReport, CoreError> {
        let _sending = self.sending.lock().await;
        let entries = self.queue.entries().await?;
        let mut report = FlushReport::default();

        for entry in entries {
            let mut saved = entry.saved;
            let result = self.transmit(&entry.event, &mut saved).await;
            if saved && !entry.saved && result.is_err() {
                self.queue.mark_saved(&entry.event).await?;
            }
            match result {
                Ok(()) => {
                    self.queue.remove(&entry.id).await?;
                    // Backlog retries must not push back the window for new samples.
                    self.mark_sent(&entry.event, false).await;
                    report.sent += 1;
                }
                Err(TransmitError::Auth) => {
                    self.queue.record_failure(&entry.id, "unauthorized").await?;
                    return Err(CoreError::AuthExpired);
                }
                Err(TransmitError::Failed(message)) => {
                    tracing::debug!(id = %entry.id, error = %message, "pending event still failing");
                    self.queue.record_failure(&entry.id, &message).await?;
                    report.still_pending += 1;
                }
            }
        }
        Ok(report)
    }

    /// Forget send markers and the pending queue for `employee_id`.
    pub async fn reset(&self, employee_id: &str) -> Result<(), CoreError> {
        self.queue.clear().await?;
        self.store.remove(&keys::last_sent(employee_id)).await?;
        self.store.remove(&keys::next_allowed_send(employee_id)).await?;
        Ok(())
    }

    pub async fn last_sent(&self, employee_id: &str) -> Result<Option<SendMarker>, CoreError> {
        Ok(read_json(self.store.as_ref(), &keys::last_sent(employee_id)).await?)
    }

    pub async fn next_allowed_send(&self, employee_id: &str) -> Result<Option<DateTime<Utc>>, CoreError> {
        Ok(read_json(self.store.as_ref(), &keys::next_allowed_send(employee_id)).await?)
    }

    /// Send `event`, then confirm it if it is a site check-in.
    ///
    /// `saved` is set once the first call succeeds; when it is already set
    /// only the confirmation is attempted.
    async fn transmit(&self, event: &Event, saved: &mut bool) -> Result<(), TransmitError> {
        let payload = EventPayload::from_event(event);
        if !*saved {
            self.call_with_refresh(|| self.remote.send(&payload)).await?;
            *saved = true;
        }
        if payload.is_site_checkin() {
            self.call_with_refresh(|| self.remote.confirm_site_checkin(&payload))
                .await?;
        }
        Ok(())
    }

    /// One call, retried once after a credential refresh on 401.
    async fn call_with_refresh<F, Fut>(&self, call: F) -> Result<(), TransmitError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<SendReceipt, ApiError>>,
    {
        match call().await {
            Err(ApiError::Unauthorized) => {
                tracing::warn!("unauthorized, refreshing credentials and retrying once");
                match self.remote.refresh_credentials().await {
                    Ok(()) => {}
                    Err(ApiError::Unauthorized) => return Err(TransmitError::Auth),
                    Err(e) => return Err(TransmitError::Failed(e.to_string())),
                }
                match call().await {
                    Err(ApiError::Unauthorized) => Err(TransmitError::Auth),
                    other => accept(other),
                }
            }
            other => accept(other),
        }
    }

    async fn requeue(&self, event: &Event, error: &str, saved: bool) -> Result<(), CoreError> {
        self.queue.enqueue(event.clone(), error, self.clock.now_utc()).await?;
        if saved {
            self.queue.mark_saved(event).await?;
        }
        Ok(())
    }

    /// Update send markers after a successful transmission.
    ///
    /// Marker writes are best effort: the server already has the event.
    async fn mark_sent(&self, event: &Event, advance_window: bool) {
        if event.kind != EventKind::Tracking {
            return;
        }
        let store = self.store.as_ref();
        let newer = match self.last_sent(&event.employee_id).await {
            Ok(Some(current)) => event.timestamp >= current.last_sent_timestamp,
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(error = %e, "last-sent marker unreadable, overwriting");
                true
            }
        };
        if newer {
            let marker = SendMarker::for_event(event);
            if let Err(e) = write_json(store, &keys::last_sent(&event.employee_id), &marker).await {
                tracing::warn!(error = %e, "failed to persist last-sent marker");
            }
        }
        if advance_window {
            let next = self.clock.now_utc() + self.policy.min_send_interval;
            if let Err(e) = write_json(store, &keys::next_allowed_send(&event.employee_id), &next).await {
                tracing::warn!(error = %e, "failed to persist next allowed send time");
            }
        }
    }
}

fn accept(result: Result<SendReceipt, ApiError>) -> Result<(), TransmitError> {
    match result {
        Ok(receipt) if receipt.ok => Ok(()),
        Ok(receipt) => Err(TransmitError::Failed(format!(
            "server status {}: {}",
            receipt.server_status, receipt.server_message
        ))),
        Err(e) => Err(TransmitError::Failed(e.to_string())),
    }
}
