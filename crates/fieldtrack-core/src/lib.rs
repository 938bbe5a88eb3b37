//! # Fieldtrack Core Library
//!
//! Location tracking and sync for field sales staff. The library owns every
//! decision (what gets recorded, what gets sent and when, whether a session
//! is open) and reaches the outside world only through the traits in
//! [`capabilities`], so the `fieldtrack` CLI and tests drive the same code.
//!
//! ## Architecture
//!
//! - **Tracking**: the [`TrackingScheduler`] state machine (Idle/Active), the
//!   deduplicating [`EventLog`] ledger, [`AddressResolver`] with a persistent
//!   cache, and [`StateReconciler`] which lets the server override the ledger
//! - **Sync**: [`SyncEngine`] applies eligibility rules, parks failed sends in
//!   the [`PendingQueue`] and retries them oldest first
//! - **API**: [`SignedClient`] performs HMAC-signed requests with automatic
//!   token refresh
//! - **Storage**: a key/value [`LocalStore`] (SQLite or in-memory) and
//!   TOML-based [`Config`]

pub mod api;
pub mod capabilities;
pub mod clock;
pub mod error;
pub mod geocoding;
pub mod storage;
pub mod sync;
pub mod tracking;

pub use api::{ApiError, Contract, NextAction, SignedClient};
pub use capabilities::{
    Capabilities, GeocodeProvider, LocationProvider, LocationSink, PermissionProvider,
    PermissionStatus, Placemark, RemoteApi, SamplerOptions, Scheduler,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, Result, StoreError};
pub use geocoding::NominatimGeocoder;
pub use storage::{Config, LocalStore, MemoryStore, SqliteStore};
pub use sync::{FlushReport, PendingQueue, SendOutcome, SkipReason, SyncEngine, SyncPolicy};
pub use tracking::{
    AddressResolver, Event, EventKind, EventLog, IntervalSampler, Position, StateReconciler,
    TrackingScheduler, TrackingState, TrackingStatus,
};
