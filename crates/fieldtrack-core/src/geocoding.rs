//! Reverse geocoding through a Nominatim server.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::api::ApiError;
use crate::capabilities::{GeocodeProvider, Placemark};
use crate::error::CoreError;
use crate::storage::GeocodingConfig;
use crate::tracking::event::Position;

/// Nominatim's usage policy allows one request per second.
const MIN_REQUEST_SPACING: Duration = Duration::from_secs(1);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: Option<NominatimAddress>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    #[serde(default)]
    road: Option<String>,
    #[serde(default)]
    house_number: Option<String>,
    #[serde(default)]
    suburb: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    town: Option<String>,
    #[serde(default)]
    village: Option<String>,
    #[serde(default)]
    county: Option<String>,
}

impl NominatimAddress {
    fn into_placemark(self) -> Placemark {
        let street = self.road.map(|road| match self.house_number {
            Some(number) => format!("{road} {number}"),
            None => road,
        });
        let city = self
            .city
            .or(self.town)
            .or(self.village)
            .or(self.county)
            .or(self.suburb);
        Placemark { street, city }
    }
}

pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
    last_request: Mutex<Option<Instant>>,
}

impl NominatimGeocoder {
    pub fn new(client: reqwest::Client, config: &GeocodingConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
            last_request: Mutex::new(None),
        }
    }

    /// Build with a dedicated HTTP client.
    pub fn from_config(config: &GeocodingConfig) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CoreError::NetworkFailure(e.to_string()))?;
        Ok(Self::new(client, config))
    }

    async fn enforce_rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            if elapsed < MIN_REQUEST_SPACING {
                tokio::time::sleep(MIN_REQUEST_SPACING - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl GeocodeProvider for NominatimGeocoder {
    async fn reverse_geocode(&self, position: Position) -> Result<Placemark, ApiError> {
        self.enforce_rate_limit().await;

        let lat = position.latitude.to_string();
        let lon = position.longitude.to_string();
        let response = self
            .client
            .get(format!("{}/reverse", self.base_url))
            .query(&[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("format", "json"),
                ("addressdetails", "1"),
            ])
            .header("User-Agent", &self.user_agent)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                code: status.as_u16(),
                message: format!("reverse geocoding failed for {lat},{lon}"),
            });
        }

        let body: ReverseResponse = response.json().await?;
        if let Some(error) = body.error {
            tracing::debug!(%error, "no reverse geocoding result");
            return Ok(Placemark::default());
        }
        Ok(body.address.unwrap_or_default().into_placemark())
    }
}
