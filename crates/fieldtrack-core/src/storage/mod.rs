mod config;
pub mod database;
pub mod keys;
pub mod memory;

pub use config::{ApiConfig, Config, GeocodingConfig, TrackingConfig};
pub use database::SqliteStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;

use crate::error::{ConfigError, CoreError, StoreError};

/// String-keyed, string-valued durable storage.
///
/// Values survive process restarts. Implementations give no transactional
/// guarantee across processes; callers that share a key with a background
/// task must tolerate interleaved writes.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Read a JSON value, treating a missing key as `T::default()`.
///
/// A value that fails to decode is logged and also read as the default;
/// persisted state is never allowed to wedge the engine.
pub async fn read_json<T>(store: &dyn LocalStore, key: &str) -> Result<T, StoreError>
where
    T: DeserializeOwned + Default,
{
    let Some(raw) = store.get(key).await? else {
        return Ok(T::default());
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "corrupt stored value, treating as empty");
            Ok(T::default())
        }
    }
}

/// Serialize and persist a JSON value.
pub async fn write_json<T>(store: &dyn LocalStore, key: &str, value: &T) -> Result<(), CoreError>
where
    T: Serialize + Sync + ?Sized,
{
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw).await?;
    Ok(())
}

/// Returns `~/.config/fieldtrack[-dev]/` based on FIELDTRACK_ENV.
///
/// Set FIELDTRACK_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("FIELDTRACK_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("fieldtrack-dev")
    } else {
        base_dir.join("fieldtrack")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}
