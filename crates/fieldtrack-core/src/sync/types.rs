//! Types shared by the pending queue and the sync engine.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tracking::event::{local_timestamp, Event};

/// The last tracking sample actually transmitted for an employee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMarker {
    #[serde(with = "local_timestamp")]
    pub last_sent_timestamp: NaiveDateTime,
    pub last_sent_latitude: f64,
    pub last_sent_longitude: f64,
}

impl SendMarker {
    pub fn for_event(event: &Event) -> Self {
        Self {
            last_sent_timestamp: event.timestamp,
            last_sent_latitude: event.latitude,
            last_sent_longitude: event.longitude,
        }
    }

    /// Exact match on coordinates and timestamp.
    pub fn matches(&self, event: &Event) -> bool {
        self.last_sent_timestamp == event.timestamp
            && self.last_sent_latitude == event.latitude
            && self.last_sent_longitude == event.longitude
    }
}

/// Why an event was not transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Identical to the last transmitted sample.
    DuplicateOfLastSent,
    /// Fired right after a Start at the same place.
    StartGuardWindow,
    /// Before `nextAllowedSendAt`.
    RateLimited,
    /// The ledger already held an event with the same identity.
    AlreadyRecorded,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            SkipReason::DuplicateOfLastSent => "duplicate of last sent sample",
            SkipReason::StartGuardWindow => "inside start guard window",
            SkipReason::RateLimited => "rate limited",
            SkipReason::AlreadyRecorded => "already recorded",
        };
        f.write_str(text)
    }
}

/// What happened to a submitted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Skipped(SkipReason),
    /// Transmission failed; the event waits in the pending queue.
    Queued(String),
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent)
    }
}

/// Result of draining the pending queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub sent: usize,
    pub still_pending: usize,
}

/// An event waiting for retransmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEvent {
    pub id: String,
    pub event: Event,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// The first of a two-step send already reached the server.
    #[serde(default)]
    pub saved: bool,
}

impl PendingEvent {
    pub fn new(event: Event, error: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event,
            enqueued_at: now,
            attempts: 1,
            last_error: Some(error.into()),
            saved: false,
        }
    }

    /// Same employee and same ledger identity.
    pub fn holds(&self, event: &Event) -> bool {
        self.event.employee_id == event.employee_id && self.event.same_identity(event)
    }
}
