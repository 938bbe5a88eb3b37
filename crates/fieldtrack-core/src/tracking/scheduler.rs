//! Tracking session state machine.
//!
//! Drives the platform sampler from explicit user intent and keeps it in
//! line with the server's next-action answer.
//!
//! ## State Transitions
//!
//! ```text
//! Idle --start()--> Active --stop()--> Idle
//!                   Active --reconcile() [server says Start]--> Idle
//! ```
//!
//! In `Active` the platform sampler runs exactly once; in `Idle` it is
//! stopped. Both directions check the sampler before touching it.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::address::AddressResolver;
use super::event::{Event, EventKind, Position};
use super::event_log::{AppendOutcome, EventLog};
use super::reconciler::{StateReconciler, StatusSource, TrackingStatus};
use crate::capabilities::{
    Capabilities, LocationProvider, LocationSink, PermissionProvider, PermissionStatus,
    SamplerOptions, Scheduler,
};
use crate::clock::Clock;
use crate::error::CoreError;
use crate::storage::{keys, LocalStore, TrackingConfig};
use crate::sync::{SendOutcome, SkipReason, SyncEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Idle,
    Active,
}

/// A recorded user action and what happened when it was sent.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionReport {
    pub event: Event,
    pub outcome: SendOutcome,
}

pub struct TrackingScheduler {
    employee_id: String,
    config: TrackingConfig,
    permissions: Arc<dyn PermissionProvider>,
    location: Arc<dyn LocationProvider>,
    sampler: Arc<dyn Scheduler>,
    store: Arc<dyn LocalStore>,
    clock: Arc<dyn Clock>,
    addresses: AddressResolver,
    reconciler: StateReconciler,
    engine: Arc<SyncEngine>,
    state: Mutex<TrackingState>,
}

impl TrackingScheduler {
    /// Starts in `Idle`; call [`resume`](Self::resume) to restore a session.
    pub fn new(
        employee_id: impl Into<String>,
        config: TrackingConfig,
        caps: &Capabilities,
        engine: Arc<SyncEngine>,
    ) -> Self {
        Self {
            employee_id: employee_id.into(),
            config,
            permissions: caps.permissions.clone(),
            location: caps.location.clone(),
            sampler: caps.sampler.clone(),
            store: caps.store.clone(),
            clock: caps.clock.clone(),
            addresses: AddressResolver::new(caps.geocoder.clone(), caps.store.clone()),
            reconciler: StateReconciler::new(engine.event_log().clone(), caps.remote.clone()),
            engine,
            state: Mutex::new(TrackingState::Idle),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub async fn state(&self) -> TrackingState {
        *self.state.lock().await
    }

    pub fn employee_id(&self) -> &str {
        &self.employee_id
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    fn event_log(&self) -> &Arc<EventLog> {
        self.engine.event_log()
    }

    /// Server-confirmed status, ledger when offline. Does not change state.
    pub async fn status(&self) -> TrackingStatus {
        self.reconciler.status(&self.employee_id).await
    }

    // ── User actions ─────────────────────────────────────────────────

    /// Idle -> Active.
    ///
    /// Requires foreground and background location permission. The Start
    /// event is recorded before the transition; a send failure afterwards
    /// does not undo it.
    ///
    /// The state lock is held until the Start has been sent or queued, so
    /// a sampler tick that fires meanwhile cannot reconcile against a
    /// server that has not heard of it yet.
    pub async fn start(self: &Arc<Self>) -> Result<ActionReport, CoreError> {
        let mut state = self.state.lock().await;
        if *state == TrackingState::Active {
            return Err(CoreError::InvalidTransition("Tracking is already active.".into()));
        }

        self.require_permissions(true).await?;
        let event = self.capture(EventKind::Start).await?;

        self.ensure_sampler_running().await?;
        if let Err(e) = self.append(&event).await {
            self.ensure_sampler_stopped().await;
            return Err(e);
        }
        *state = TrackingState::Active;
        self.persist_hint(true).await;

        tracing::info!(employee = %self.employee_id, "tracking started");
        let outcome = self.engine.submit(&event).await;
        drop(state);
        Ok(ActionReport {
            event,
            outcome: outcome?,
        })
    }

    /// Active -> Idle.
    pub async fn stop(&self) -> Result<ActionReport, CoreError> {
        let mut state = self.state.lock().await;
        if *state == TrackingState::Idle {
            return Err(CoreError::InvalidTransition("Tracking is not active.".into()));
        }

        let event = self.capture(EventKind::Stop).await?;
        self.append(&event).await?;

        self.ensure_sampler_stopped().await;
        *state = TrackingState::Idle;
        self.persist_hint(false).await;
        drop(state);

        tracing::info!(employee = %self.employee_id, "tracking stopped");
        let outcome = self.engine.submit(&event).await?;
        Ok(ActionReport { event, outcome })
    }

    /// Record arrival at a contract's site. Allowed in either state.
    pub async fn site_checkin(
        &self,
        contract_id: &str,
        contract_name: Option<&str>,
        comment: Option<&str>,
    ) -> Result<ActionReport, CoreError> {
        self.require_permissions(false).await?;
        let position = self.location.current_position().await?;
        let address = self.addresses.resolve(position).await;

        let mut event = Event::site_checkin(&self.employee_id, contract_id, position, self.local_now())
            .with_address(address);
        if let Some(name) = contract_name {
            event = event.with_contract_name(name);
        }
        if let Some(comment) = comment.filter(|c| !c.trim().is_empty()) {
            event = event.with_comment(comment);
        }

        let outcome = self.engine.record(event.clone()).await?;
        Ok(ActionReport { event, outcome })
    }

    // ── Background ───────────────────────────────────────────────────

    /// Handle one sampler delivery.
    ///
    /// Reconciles with the server, then hands the sample to the engine,
    /// which retries the backlog before evaluating it. Returns `None` when
    /// the sample was dropped because the session is not (or no longer)
    /// active.
    pub async fn handle_sample(&self, position: Position) -> Result<Option<SendOutcome>, CoreError> {
        self.reconcile().await;
        if self.state().await == TrackingState::Idle {
            tracing::debug!("sample ignored, tracking idle");
            return Ok(None);
        }

        let event = Event::new(EventKind::Tracking, &self.employee_id, position, self.local_now());
        let outcome = self.engine.process_tick(event).await?;
        if let SendOutcome::Skipped(reason) = &outcome {
            if *reason != SkipReason::AlreadyRecorded {
                tracing::debug!(%reason, "tracking sample skipped");
            }
        }
        Ok(Some(outcome))
    }

    /// Align local state with the server's next-action answer.
    ///
    /// If the server says a session is not open while this device still
    /// tracks, tracking is forced to `Idle` and the sampler stopped. The
    /// opposite disagreement is only logged: a session opened elsewhere
    /// does not start sampling here. While this device still has unsent
    /// events the server's view lags behind, so nothing is forced.
    ///
    /// The state lock is taken before the server is asked, so the answer
    /// is never older than a transition made in the meantime.
    ///
    /// Returns the server-backed status, or `None` when the server could
    /// not be reached.
    pub async fn reconcile(&self) -> Option<TrackingStatus> {
        let mut state = self.state.lock().await;
        let status = self.reconciler.status(&self.employee_id).await;
        if status.source != StatusSource::Server {
            return None;
        }
        let backlog = match self.engine.pending().is_empty().await {
            Ok(empty) => !empty,
            Err(e) => {
                tracing::warn!(error = %e, "pending queue unreadable");
                true
            }
        };

        match (*state, status.active) {
            (TrackingState::Active, false) if backlog => {
                tracing::info!("server reports no open session but local events are unsent, keeping state");
            }
            (TrackingState::Active, false) => {
                tracing::warn!(employee = %self.employee_id, "server reports no open session, stopping tracking");
                self.ensure_sampler_stopped().await;
                *state = TrackingState::Idle;
                self.persist_hint(false).await;
            }
            (TrackingState::Idle, true) => {
                tracing::info!(employee = %self.employee_id, "server reports an open session not tracked here");
            }
            _ => {}
        }
        Some(status)
    }

    /// Restore state after a restart or foreground resume.
    ///
    /// The ledger decides the initial state, then the server gets the final
    /// word through [`reconcile`](Self::reconcile).
    pub async fn resume(self: &Arc<Self>) -> Result<TrackingState, CoreError> {
        self.event_log().reload().await?;
        let local = self.reconciler.local_status().await;
        {
            let mut state = self.state.lock().await;
            if local.active {
                self.ensure_sampler_running().await?;
                *state = TrackingState::Active;
            } else {
                self.ensure_sampler_stopped().await;
                *state = TrackingState::Idle;
            }
            self.persist_hint(local.active).await;
        }
        self.reconcile().await;
        Ok(self.state().await)
    }

    /// Wipe every trace of the session on this device.
    pub async fn logout(&self) -> Result<(), CoreError> {
        let mut state = self.state.lock().await;
        self.ensure_sampler_stopped().await;
        *state = TrackingState::Idle;
        self.event_log().clear().await?;
        self.engine.reset(&self.employee_id).await?;
        self.store.remove(keys::TRACKING_ACTIVE).await?;
        tracing::info!(employee = %self.employee_id, "local tracking state cleared");
        Ok(())
    }

    // ── Internals ────────────────────────────────────────────────────

    fn local_now(&self) -> chrono::NaiveDateTime {
        self.clock.now_local(self.config.utc_offset_hours)
    }

    async fn require_permissions(&self, background: bool) -> Result<(), CoreError> {
        let foreground = self.permissions.request_foreground().await;
        if !foreground.is_granted() {
            return Err(CoreError::PermissionDenied {
                can_ask_again: foreground != PermissionStatus::DeniedPermanently,
            });
        }
        if background {
            match self.permissions.request_background().await {
                PermissionStatus::Granted => {}
                PermissionStatus::Denied => {
                    return Err(CoreError::PermissionDenied { can_ask_again: true })
                }
                PermissionStatus::DeniedPermanently => {
                    return Err(CoreError::PermissionDenied { can_ask_again: false })
                }
            }
        }
        Ok(())
    }

    async fn capture(&self, kind: EventKind) -> Result<Event, CoreError> {
        let position = self.location.current_position().await?;
        let address = self.addresses.resolve(position).await;
        Ok(Event::new(kind, &self.employee_id, position, self.local_now()).with_address(address))
    }

    async fn append(&self, event: &Event) -> Result<(), CoreError> {
        if self.event_log().append(event.clone()).await? == AppendOutcome::DuplicateSkipped {
            tracing::debug!(kind = %event.kind, "event already in ledger");
        }
        Ok(())
    }

    fn sampler_options(&self) -> SamplerOptions {
        SamplerOptions {
            interval: Duration::from_secs(self.config.sample_interval_secs),
            min_distance_m: self.config.min_distance_m,
        }
    }

    async fn ensure_sampler_running(self: &Arc<Self>) -> Result<(), CoreError> {
        if self.sampler.is_running().await {
            return Ok(());
        }
        let sink: Arc<dyn LocationSink> = self.clone();
        self.sampler.start_periodic(self.sampler_options(), sink).await
    }

    /// Stopping is best effort; a failure is logged.
    async fn ensure_sampler_stopped(&self) {
        if !self.sampler.is_running().await {
            return;
        }
        if let Err(e) = self.sampler.stop_periodic().await {
            tracing::warn!(error = %e, "failed to stop periodic sampler");
        }
    }

    /// Cached hint only; the ledger and server stay authoritative.
    async fn persist_hint(&self, active: bool) {
        let value = if active { "true" } else { "false" };
        if let Err(e) = self.store.set(keys::TRACKING_ACTIVE, value).await {
            tracing::warn!(error = %e, "failed to persist tracking hint");
        }
    }
}

#[async_trait]
impl LocationSink for TrackingScheduler {
    /// Background errors are logged, never surfaced.
    async fn on_location(&self, position: Position) {
        match self.handle_sample(position).await {
            Ok(Some(outcome)) => tracing::debug!(?outcome, "tracking sample handled"),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "tracking sample failed"),
        }
    }
}
