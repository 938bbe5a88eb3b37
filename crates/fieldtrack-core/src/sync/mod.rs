//! Transmission of recorded events to the backend.
//!
//! The [`SyncEngine`] decides whether an event may be sent now, sends it
//! through the injected [`RemoteApi`](crate::capabilities::RemoteApi), and
//! parks failures in the persisted [`PendingQueue`] for the next tick.

pub mod sync_engine;
pub mod sync_queue;
pub mod types;


pub use sync_engine::{SyncEngine, SyncPolicy};
pub use sync_queue::PendingQueue;
pub use types::{FlushReport, PendingEvent, SendMarker, SendOutcome, SkipReason};
