//! Platform capabilities the tracking core depends on.
//!
//! Permissions, GPS, reverse geocoding, the periodic sampler and the remote
//! server are all injected as trait objects so the core runs the same way
//! under a CLI, a device shell, or tests.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::api::{ApiError, EventPayload, NextAction, SendReceipt};
use crate::clock::Clock;
use crate::error::CoreError;
use crate::storage::LocalStore;
use crate::tracking::event::Position;

/// Answer to a permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// The prompt will not be shown again; settings must be changed.
    DeniedPermanently,
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }
}

#[async_trait]
pub trait PermissionProvider: Send + Sync {
    async fn request_foreground(&self) -> PermissionStatus;

    async fn request_background(&self) -> PermissionStatus;
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Fails with [`CoreError::LocationUnavailable`] without a fix.
    async fn current_position(&self) -> Result<Position, CoreError>;
}

/// Best-effort reverse geocoding result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placemark {
    pub street: Option<String>,
    pub city: Option<String>,
}

impl Placemark {
    /// `"street, city"`, skipping empty parts.
    pub fn display(&self) -> String {
        [self.street.as_deref(), self.city.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    async fn reverse_geocode(&self, position: Position) -> Result<Placemark, ApiError>;
}

/// Receives positions from the periodic sampler.
#[async_trait]
pub trait LocationSink: Send + Sync {
    async fn on_location(&self, position: Position);
}

/// Parameters for periodic sampling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerOptions {
    pub interval: Duration,
    pub min_distance_m: f64,
}

/// OS-level background sampler.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn start_periodic(
        &self,
        options: SamplerOptions,
        sink: Arc<dyn LocationSink>,
    ) -> Result<(), CoreError>;

    async fn stop_periodic(&self) -> Result<(), CoreError>;

    async fn is_running(&self) -> bool;
}

/// Signed backend the sync engine transmits to.
///
/// A site check-in is two calls: [`send`](Self::send) saves it, then
/// [`confirm_site_checkin`](Self::confirm_site_checkin) stamps the contract.
/// The engine retries each step on its own.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn send(&self, payload: &EventPayload) -> Result<SendReceipt, ApiError>;

    /// Second step of a site check-in. Backends without one accept at once.
    async fn confirm_site_checkin(&self, _payload: &EventPayload) -> Result<SendReceipt, ApiError> {
        Ok(SendReceipt {
            ok: true,
            server_status: 1,
            server_message: String::new(),
        })
    }

    async fn query_next_action(&self, employee_id: &str) -> Result<NextAction, ApiError>;

    /// Force a new credential before the next call.
    async fn refresh_credentials(&self) -> Result<(), ApiError>;
}

/// Every platform service the tracker needs, wired once at startup.
#[derive(Clone)]
pub struct Capabilities {
    pub permissions: Arc<dyn PermissionProvider>,
    pub location: Arc<dyn LocationProvider>,
    pub geocoder: Arc<dyn GeocodeProvider>,
    pub sampler: Arc<dyn Scheduler>,
    pub remote: Arc<dyn RemoteApi>,
    pub store: Arc<dyn LocalStore>,
    pub clock: Arc<dyn Clock>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placemark_joins_present_parts() {
        let full = Placemark {
            street: Some("Jl. Sudirman".into()),
            city: Some("Jakarta Selatan".into()),
        };
        assert_eq!(full.display(), "Jl. Sudirman, Jakarta Selatan");

        let city_only = Placemark {
            street: Some("  ".into()),
            city: Some("Bandung".into()),
        };
        assert_eq!(city_only.display(), "Bandung");
        assert_eq!(Placemark::default().display(), "");
    }
}
