//! Keys under which tracking state lives in the [`LocalStore`](super::LocalStore).

/// Cached "tracking is active" hint. Never trusted without reconciliation.
pub const TRACKING_ACTIVE: &str = "isTracking";

/// JSON array of every recorded event.
pub const EVENT_LEDGER: &str = "CheckinLocations";

/// JSON array of events whose transmission failed.
pub const PENDING_QUEUE: &str = "pendingEvents";

/// Whether the periodic sampler was registered (used by the CLI sampler).
pub const SAMPLER_REGISTERED: &str = "samplerRegistered";

/// Last transmitted tracking sample for an employee.
pub fn last_sent(employee_id: &str) -> String {
    format!("lastSentTracking:{employee_id}")
}

/// Earliest instant the next tracking sample may be transmitted.
pub fn next_allowed_send(employee_id: &str) -> String {
    format!("nextAllowedSendAt:{employee_id}")
}

/// Resolved address for an already quantized coordinate pair.
pub fn address(quantized_lat: &str, quantized_lon: &str) -> String {
    format!("address:{quantized_lat},{quantized_lon}")
}
