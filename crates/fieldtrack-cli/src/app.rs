//! Wiring of the tracking core for one CLI invocation.
//!
//! Each `fieldtrack` run is a short-lived process: positions arrive on the
//! command line, permissions are implied by the operator running the
//! command, and periodic sampling is delegated to an external scheduler
//! (cron, systemd timer, device shell) that calls `fieldtrack sample`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use fieldtrack_core::capabilities::{
    Capabilities, LocationProvider, LocationSink, PermissionProvider, PermissionStatus,
    SamplerOptions, Scheduler,
};
use fieldtrack_core::clock::{Clock, SystemClock};
use fieldtrack_core::storage::{keys, read_json, write_json, LocalStore};
use fieldtrack_core::sync::{SyncEngine, SyncPolicy};
use fieldtrack_core::tracking::{EventLog, Position, TrackingScheduler};
use fieldtrack_core::{Config, CoreError, NominatimGeocoder, SignedClient, SqliteStore};

/// The operator invoking the CLI has already granted location access.
pub struct StaticPermissions;

#[async_trait]
impl PermissionProvider for StaticPermissions {
    async fn request_foreground(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    async fn request_background(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }
}

/// Position passed with `--lat/--lon`.
pub struct FixedLocation(pub Option<Position>);

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current_position(&self) -> Result<Position, CoreError> {
        match self.0 {
            Some(position) if position.is_valid() => Ok(position),
            Some(position) => Err(CoreError::LocationUnavailable(format!(
                "{},{} is not a valid coordinate",
                position.latitude, position.longitude
            ))),
            None => Err(CoreError::LocationUnavailable(
                "no position given, pass --lat and --lon".into(),
            )),
        }
    }
}

/// What the external scheduler needs to know to drive `fieldtrack sample`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplerRegistration {
    pub interval_secs: u64,
    pub min_distance_m: f64,
}

/// Periodic sampling as a persisted "registered" flag.
///
/// The sink is not kept: samples reach the scheduler through a later
/// `fieldtrack sample` process.
pub struct FlagSampler {
    store: Arc<dyn LocalStore>,
}

impl FlagSampler {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    pub async fn registration(&self) -> Result<Option<SamplerRegistration>, CoreError> {
        let registration: Option<SamplerRegistration> =
            read_json(self.store.as_ref(), keys::SAMPLER_REGISTERED).await?;
        Ok(registration)
    }
}

#[async_trait]
impl Scheduler for FlagSampler {
    async fn start_periodic(
        &self,
        options: SamplerOptions,
        _sink: Arc<dyn LocationSink>,
    ) -> Result<(), CoreError> {
        let registration = SamplerRegistration {
            interval_secs: options.interval.as_secs(),
            min_distance_m: options.min_distance_m,
        };
        write_json(self.store.as_ref(), keys::SAMPLER_REGISTERED, &registration).await?;
        tracing::debug!(interval_secs = registration.interval_secs, "periodic sampling registered");
        Ok(())
    }

    async fn stop_periodic(&self) -> Result<(), CoreError> {
        self.store.remove(keys::SAMPLER_REGISTERED).await?;
        tracing::debug!("periodic sampling unregistered");
        Ok(())
    }

    async fn is_running(&self) -> bool {
        matches!(self.store.get(keys::SAMPLER_REGISTERED).await, Ok(Some(_)))
    }
}

/// A fully wired tracker for the signed-in employee.
pub struct App {
    pub config: Config,
    pub client: Arc<SignedClient>,
    pub scheduler: Arc<TrackingScheduler>,
    pub sampler: Arc<FlagSampler>,
}

impl App {
    /// Load config and storage and build the tracker.
    ///
    /// Fails with [`CoreError::NotSignedIn`] when no employee is configured.
    pub async fn open(position: Option<Position>) -> Result<Self, CoreError> {
        let config = Config::load()?;
        let store: Arc<dyn LocalStore> = Arc::new(SqliteStore::open()?);
        Self::with_store(config, store, position).await
    }

    pub async fn with_store(
        config: Config,
        store: Arc<dyn LocalStore>,
        position: Option<Position>,
    ) -> Result<Self, CoreError> {
        let employee_id = config.employee_id.as_deref().unwrap_or_default().trim().to_string();
        if employee_id.is_empty() {
            return Err(CoreError::NotSignedIn);
        }

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let client = Arc::new(SignedClient::new(&config.api, clock.clone())?);
        let sampler = Arc::new(FlagSampler::new(store.clone()));
        let caps = Capabilities {
            permissions: Arc::new(StaticPermissions),
            location: Arc::new(FixedLocation(position)),
            geocoder: Arc::new(NominatimGeocoder::from_config(&config.geocoding)?),
            sampler: sampler.clone(),
            remote: client.clone(),
            store: store.clone(),
            clock: clock.clone(),
        };

        let log = Arc::new(EventLog::load(store.clone()).await?);
        let engine = Arc::new(SyncEngine::new(
            caps.remote.clone(),
            store,
            log,
            clock,
            SyncPolicy::from_config(&config.tracking),
        ));
        let scheduler = Arc::new(TrackingScheduler::new(
            employee_id,
            config.tracking.clone(),
            &caps,
            engine,
        ));

        Ok(Self {
            config,
            client,
            scheduler,
            sampler,
        })
    }

    pub fn employee_id(&self) -> &str {
        self.scheduler.employee_id()
    }
}

/// Parse `--lat/--lon` into a position when both are present.
pub fn position_from(lat: Option<f64>, lon: Option<f64>) -> Option<Position> {
    match (lat, lon) {
        (Some(lat), Some(lon)) => Some(Position::new(lat, lon)),
        _ => None,
    }
}
