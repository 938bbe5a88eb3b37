//! Location events, the ledger, and the session state machine.

pub mod address;
pub mod event;
pub mod event_log;
pub mod reconciler;
pub mod route;
pub mod sampler;
pub mod scheduler;

pub use address::AddressResolver;
pub use event::{DedupKey, Event, EventKind, Position};
pub use event_log::{derive_active_session, AppendOutcome, EventLog};
pub use reconciler::{StateReconciler, StatusSource, TrackingStatus};
pub use sampler::IntervalSampler;
pub use scheduler::{ActionReport, TrackingScheduler, TrackingState};
