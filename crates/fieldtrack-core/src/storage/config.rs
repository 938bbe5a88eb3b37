//! TOML-based application configuration.
//!
//! Stores:
//! - Tracking cadence and send-rate limits
//! - Remote API endpoint and client credentials
//! - Reverse geocoding service settings
//!
//! Configuration is stored at `~/.config/fieldtrack/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;

/// Environment variable that overrides `api.client_secret`.
pub const CLIENT_SECRET_ENV: &str = "FIELDTRACK_CLIENT_SECRET";

/// Sampling and transmission cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// How often the OS sampler is asked to deliver a position.
    #[serde(default = "default_sample_interval_secs")]
    pub sample_interval_secs: u64,
    /// Minimum displacement before the sampler delivers a new position.
    #[serde(default = "default_min_distance_m")]
    pub min_distance_m: f64,
    /// Minimum spacing between two transmitted tracking samples.
    #[serde(default = "default_min_send_interval_secs")]
    pub min_send_interval_secs: u64,
    /// A tracking sample this close in time to a Start is not sent.
    #[serde(default = "default_start_guard_secs")]
    pub start_guard_secs: i64,
    /// ...provided it is also within this many metres of the Start.
    #[serde(default = "default_start_guard_radius_m")]
    pub start_guard_radius_m: f64,
    /// Offset applied to UTC when stamping events with local time.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
    /// Route view drops points closer than this to the previous kept point.
    #[serde(default = "default_route_thinning_m")]
    pub route_thinning_m: f64,
}

/// Remote API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default)]
    pub client_id: String,
    /// Prefer the FIELDTRACK_CLIENT_SECRET environment variable.
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Tokens are refreshed this long before their expiry.
    #[serde(default = "default_token_refresh_margin_secs")]
    pub token_refresh_margin_secs: i64,
    #[serde(default = "default_save_checkin_path")]
    pub save_checkin_path: String,
    #[serde(default = "default_update_checkin_path")]
    pub update_checkin_path: String,
    #[serde(default = "default_update_comment_path")]
    pub update_comment_path: String,
    #[serde(default = "default_contracts_path")]
    pub contracts_path: String,
    #[serde(default = "default_next_action_path")]
    pub next_action_path: String,
}

/// Reverse geocoding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    #[serde(default = "default_geocoding_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/fieldtrack/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Employee the device is signed in as.
    #[serde(default)]
    pub employee_id: Option<String>,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub geocoding: GeocodingConfig,
}

fn default_sample_interval_secs() -> u64 {
    120
}
fn default_min_distance_m() -> f64 {
    200.0
}
fn default_min_send_interval_secs() -> u64 {
    300
}
fn default_start_guard_secs() -> i64 {
    30
}
fn default_start_guard_radius_m() -> f64 {
    25.0
}
fn default_utc_offset_hours() -> i32 {
    7
}
fn default_route_thinning_m() -> f64 {
    20.0
}
fn default_base_url() -> String {
    "https://betaapi.mitsuilease.co.id:4151".into()
}
fn default_token_url() -> String {
    "https://betaapi.mitsuilease.co.id:4200/oauth/v1/auth/accesstoken".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_token_refresh_margin_secs() -> i64 {
    60
}
fn default_save_checkin_path() -> String {
    "/common/v1/mobile/save-checkin".into()
}
fn default_update_checkin_path() -> String {
    "/common/v1/mobile/update-check".into()
}
fn default_update_comment_path() -> String {
    "/common/v1/mobile/update-comment".into()
}
fn default_contracts_path() -> String {
    "/common/v1/mobile/get-list-dtl".into()
}
fn default_next_action_path() -> String {
    "/common/v1/mobile/get-next-action".into()
}
fn default_geocoding_base_url() -> String {
    "https://nominatim.openstreetmap.org".into()
}
fn default_user_agent() -> String {
    "fieldtrack/0.1".into()
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: default_sample_interval_secs(),
            min_distance_m: default_min_distance_m(),
            min_send_interval_secs: default_min_send_interval_secs(),
            start_guard_secs: default_start_guard_secs(),
            start_guard_radius_m: default_start_guard_radius_m(),
            utc_offset_hours: default_utc_offset_hours(),
            route_thinning_m: default_route_thinning_m(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_url: default_token_url(),
            client_id: String::new(),
            client_secret: String::new(),
            timeout_secs: default_timeout_secs(),
            token_refresh_margin_secs: default_token_refresh_margin_secs(),
            save_checkin_path: default_save_checkin_path(),
            update_checkin_path: default_update_checkin_path(),
            update_comment_path: default_update_comment_path(),
            contracts_path: default_contracts_path(),
            next_action_path: default_next_action_path(),
        }
    }
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            base_url: default_geocoding_base_url(),
            user_agent: default_user_agent(),
        }
    }
}

impl ApiConfig {
    /// Client secret, taking the environment override into account.
    pub fn resolved_client_secret(&self) -> String {
        std::env::var(CLIENT_SECRET_ENV).unwrap_or_else(|_| self.client_secret.clone())
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(invalid("config key is empty".into()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| invalid("unknown config key".into()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| invalid("unknown config key".into()))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<i64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| invalid("unknown config key".into()))?;
        }

        Err(invalid("unknown config key".into()))
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from an explicit path, writing defaults there when missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// Persist to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without saving. Returns error if key is unknown.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self)
            .map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self =
            serde_json::from_value(json).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}
