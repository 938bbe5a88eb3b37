//! Shared fakes for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use fieldtrack_core::api::{ApiError, EventPayload, NextAction, SendReceipt};
use fieldtrack_core::capabilities::{
    Capabilities, GeocodeProvider, LocationProvider, LocationSink, PermissionProvider,
    PermissionStatus, Placemark, RemoteApi, SamplerOptions, Scheduler,
};
use fieldtrack_core::clock::ManualClock;
use fieldtrack_core::storage::{LocalStore, MemoryStore, TrackingConfig};
use fieldtrack_core::sync::{SyncEngine, SyncPolicy};
use fieldtrack_core::tracking::{EventLog, Position, TrackingScheduler};
use fieldtrack_core::CoreError;

pub const EMPLOYEE: &str = "sales01";

// ============================================================================
// Permissions and location
// ============================================================================

pub struct FakePermissions {
    foreground: Mutex<PermissionStatus>,
    background: Mutex<PermissionStatus>,
}

impl FakePermissions {
    pub fn granted() -> Self {
        Self {
            foreground: Mutex::new(PermissionStatus::Granted),
            background: Mutex::new(PermissionStatus::Granted),
        }
    }

    pub fn set_foreground(&self, status: PermissionStatus) {
        *self.foreground.lock().unwrap() = status;
    }

    pub fn set_background(&self, status: PermissionStatus) {
        *self.background.lock().unwrap() = status;
    }
}

#[async_trait]
impl PermissionProvider for FakePermissions {
    async fn request_foreground(&self) -> PermissionStatus {
        *self.foreground.lock().unwrap()
    }

    async fn request_background(&self) -> PermissionStatus {
        *self.background.lock().unwrap()
    }
}

pub struct FakeLocation {
    position: Mutex<Option<Position>>,
}

impl FakeLocation {
    pub fn at(position: Position) -> Self {
        Self {
            position: Mutex::new(Some(position)),
        }
    }

    pub fn move_to(&self, position: Position) {
        *self.position.lock().unwrap() = Some(position);
    }

    pub fn lose_fix(&self) {
        *self.position.lock().unwrap() = None;
    }
}

#[async_trait]
impl LocationProvider for FakeLocation {
    async fn current_position(&self) -> Result<Position, CoreError> {
        (*self.position.lock().unwrap())
            .ok_or_else(|| CoreError::LocationUnavailable("no GPS fix".into()))
    }
}

#[derive(Default)]
pub struct FakeGeocoder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl GeocodeProvider for FakeGeocoder {
    async fn reverse_geocode(&self, _position: Position) -> Result<Placemark, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Placemark {
            street: Some("Jl. Sudirman".into()),
            city: Some("Jakarta".into()),
        })
    }
}

// ============================================================================
// Sampler
// ============================================================================

/// Counts start/stop calls and lets the test deliver samples by hand.
#[derive(Default)]
pub struct RecordingSampler {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    sink: Mutex<Option<Arc<dyn LocationSink>>>,
    options: Mutex<Option<SamplerOptions>>,
}

impl RecordingSampler {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn options(&self) -> Option<SamplerOptions> {
        *self.options.lock().unwrap()
    }

    /// Push one position through the registered sink, as the OS would.
    pub async fn deliver(&self, position: Position) -> bool {
        let sink = self.sink.lock().unwrap().clone();
        match sink {
            Some(sink) => {
                sink.on_location(position).await;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl Scheduler for RecordingSampler {
    async fn start_periodic(
        &self,
        options: SamplerOptions,
        sink: Arc<dyn LocationSink>,
    ) -> Result<(), CoreError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.options.lock().unwrap() = Some(options);
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    async fn stop_periodic(&self) -> Result<(), CoreError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock().unwrap() = None;
        Ok(())
    }

    async fn is_running(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }
}

// ============================================================================
// Remote
// ============================================================================

pub fn ok_receipt() -> SendReceipt {
    SendReceipt {
        ok: true,
        server_status: 1,
        server_message: "Success".into(),
    }
}

/// Scripted backend. Sends succeed unless scripted otherwise; the
/// next-action query is unreachable until [`FakeRemote::answer`] is set.
#[derive(Default)]
pub struct FakeRemote {
    script: Mutex<VecDeque<Result<SendReceipt, ApiError>>>,
    sent: Mutex<Vec<EventPayload>>,
    next_action: Mutex<Option<NextAction>>,
    pub queries: AtomicUsize,
    pub refreshes: AtomicUsize,
}

impl FakeRemote {
    pub fn then(&self, response: Result<SendReceipt, ApiError>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn fail_next(&self, n: usize) {
        for _ in 0..n {
            self.then(Err(ApiError::Network("connection reset".into())));
        }
    }

    pub fn answer(&self, action: Option<NextAction>) {
        *self.next_action.lock().unwrap() = action;
    }

    pub fn sent(&self) -> Vec<EventPayload> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_kinds(&self) -> Vec<String> {
        self.sent().into_iter().map(|p| p.kind).collect()
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn send(&self, payload: &EventPayload) -> Result<SendReceipt, ApiError> {
        self.sent.lock().unwrap().push(payload.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ok_receipt()))
    }

    async fn query_next_action(&self, _employee_id: &str) -> Result<NextAction, ApiError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        (*self.next_action.lock().unwrap()).ok_or_else(|| ApiError::Network("offline".into()))
    }

    async fn refresh_credentials(&self) -> Result<(), ApiError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Rig
// ============================================================================

pub fn jakarta() -> Position {
    Position::new(-6.2, 106.8)
}

/// A tracker wired to fakes, with the clock at 2025-07-01 10:00 local (+7).
pub struct Rig {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub permissions: Arc<FakePermissions>,
    pub location: Arc<FakeLocation>,
    pub geocoder: Arc<FakeGeocoder>,
    pub sampler: Arc<RecordingSampler>,
    pub remote: Arc<FakeRemote>,
    pub caps: Capabilities,
    pub config: TrackingConfig,
    pub scheduler: Arc<TrackingScheduler>,
}

impl Rig {
    pub async fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new())).await
    }

    /// Build over an existing store, as a restarted process would.
    pub async fn with_store(store: Arc<MemoryStore>) -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 7, 1, 3, 0, 0).unwrap(),
        ));
        let permissions = Arc::new(FakePermissions::granted());
        let location = Arc::new(FakeLocation::at(jakarta()));
        let geocoder = Arc::new(FakeGeocoder::default());
        let sampler = Arc::new(RecordingSampler::default());
        let remote = Arc::new(FakeRemote::default());
        let caps = Capabilities {
            permissions: permissions.clone(),
            location: location.clone(),
            geocoder: geocoder.clone(),
            sampler: sampler.clone(),
            remote: remote.clone(),
            store: store.clone(),
            clock: clock.clone(),
        };
        let config = TrackingConfig::default();
        let scheduler = build_scheduler(&caps, &config).await;
        Self {
            store,
            clock,
            permissions,
            location,
            geocoder,
            sampler,
            remote,
            caps,
            config,
            scheduler,
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        self.scheduler.engine()
    }

    pub fn advance_secs(&self, secs: i64) {
        self.clock.advance(chrono::Duration::seconds(secs));
    }
}

pub async fn build_scheduler(caps: &Capabilities, config: &TrackingConfig) -> Arc<TrackingScheduler> {
    let store: Arc<dyn LocalStore> = caps.store.clone();
    let log = Arc::new(EventLog::load(store.clone()).await.unwrap());
    let engine = Arc::new(SyncEngine::new(
        caps.remote.clone(),
        store,
        log,
        caps.clock.clone(),
        SyncPolicy::from_config(config),
    ));
    Arc::new(TrackingScheduler::new(EMPLOYEE, config.clone(), caps, engine))
}
