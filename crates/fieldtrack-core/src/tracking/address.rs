//! Cached reverse geocoding.

use std::sync::Arc;

use super::event::Position;
use crate::capabilities::GeocodeProvider;
use crate::storage::{keys, LocalStore};

/// Decimal places kept when building a cache key (about 1 m).
const CACHE_PRECISION: usize = 5;

/// Resolves coordinates to `"street, city"`, caching non-empty results.
pub struct AddressResolver {
    geocoder: Arc<dyn GeocodeProvider>,
    store: Arc<dyn LocalStore>,
}

impl AddressResolver {
    pub fn new(geocoder: Arc<dyn GeocodeProvider>, store: Arc<dyn LocalStore>) -> Self {
        Self { geocoder, store }
    }

    /// Never fails: an unresolvable position yields `""`.
    pub async fn resolve(&self, position: Position) -> String {
        if !position.latitude.is_finite() || !position.longitude.is_finite() {
            return String::new();
        }
        let key = cache_key(position);

        match self.store.get(&key).await {
            Ok(Some(cached)) if !cached.is_empty() => return cached,
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "address cache read failed"),
        }

        let address = match self.geocoder.reverse_geocode(position).await {
            Ok(place) => place.display(),
            Err(e) => {
                tracing::warn!(error = %e, "reverse geocoding failed");
                return String::new();
            }
        };

        if !address.is_empty() {
            if let Err(e) = self.store.set(&key, &address).await {
                tracing::warn!(error = %e, "address cache write failed");
            }
        }
        address
    }
}

/// Cache key for a coordinate pair quantized to a fixed precision.
pub fn cache_key(position: Position) -> String {
    let lat = format!("{:.*}", CACHE_PRECISION, position.latitude);
    let lon = format!("{:.*}", CACHE_PRECISION, position.longitude);
    keys::address(&lat, &lon)
}
