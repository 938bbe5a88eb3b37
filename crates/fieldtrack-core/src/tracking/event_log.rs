//! Deduplicated, append-only ledger of location events.
//!
//! The ledger is persisted as a JSON array under [`keys::EVENT_LEDGER`].
//! Both the foreground and the background sampler may append at nearly the
//! same moment, possibly from separate processes sharing the store, so every
//! append re-reads the durable copy and checks it for a duplicate before
//! writing. The durable copy is authoritative: the in-memory copy is only a
//! cache of the last read or write, so a logout from one handle stays
//! cleared for every other. The `(contractId, kind, timestamp)` key is what
//! keeps the two writers from double-inserting.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::event::{DedupKey, Event, EventKind};
use crate::error::CoreError;
use crate::storage::{keys, read_json, write_json, LocalStore};

/// Result of [`EventLog::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted,
    DuplicateSkipped,
}

pub struct EventLog {
    store: Arc<dyn LocalStore>,
    events: Mutex<Vec<Event>>,
}

impl EventLog {
    /// Load the ledger from the store. A corrupt ledger loads as empty.
    pub async fn load(store: Arc<dyn LocalStore>) -> Result<Self, CoreError> {
        let events: Vec<Event> = read_json(store.as_ref(), keys::EVENT_LEDGER).await?;
        tracing::debug!(count = events.len(), "event ledger loaded");
        Ok(Self {
            store,
            events: Mutex::new(events),
        })
    }

    /// Append an event unless one with the same identity exists.
    ///
    /// On a failed write the in-memory ledger is left untouched and the
    /// error is returned.
    pub async fn append(&self, event: Event) -> Result<AppendOutcome, CoreError> {
        let mut events = self.events.lock().await;
        let mut durable = self.read_durable().await?;

        if durable.iter().any(|e| e.same_identity(&event)) {
            tracing::debug!(kind = %event.kind, ts = %event.timestamp_string(), "duplicate event skipped");
            *events = durable;
            return Ok(AppendOutcome::DuplicateSkipped);
        }

        durable.push(event);
        write_json(self.store.as_ref(), keys::EVENT_LEDGER, &durable).await?;
        *events = durable;
        Ok(AppendOutcome::Inserted)
    }

    /// Append many events with one write. Returns how many were new.
    pub async fn import(&self, incoming: Vec<Event>) -> Result<usize, CoreError> {
        let mut events = self.events.lock().await;
        let mut durable = self.read_durable().await?;
        let mut seen: HashSet<DedupKey> = durable.iter().map(Event::dedup_key).collect();

        let before = durable.len();
        for event in incoming {
            if seen.insert(event.dedup_key()) {
                durable.push(event);
            }
        }
        let added = durable.len() - before;
        if added > 0 {
            write_json(self.store.as_ref(), keys::EVENT_LEDGER, &durable).await?;
        }
        *events = durable;
        Ok(added)
    }

    /// Snapshot of every event in insertion order.
    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }

    /// Whether a Start is currently open.
    pub async fn derive_active_session(&self) -> bool {
        derive_active_session(&self.events.lock().await)
    }

    /// Most recent event of `kind` recorded by `employee_id`.
    pub async fn latest_for(&self, kind: EventKind, employee_id: &str) -> Option<Event> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.kind == kind && e.employee_id == employee_id)
            .max_by_key(|e| e.timestamp)
            .cloned()
    }

    /// Pick up writes made by another handle or process.
    pub async fn reload(&self) -> Result<(), CoreError> {
        let mut events = self.events.lock().await;
        *events = self.read_durable().await?;
        Ok(())
    }

    /// Drop every event. Only used on logout.
    pub async fn clear(&self) -> Result<(), CoreError> {
        let mut events = self.events.lock().await;
        self.store.remove(keys::EVENT_LEDGER).await?;
        events.clear();
        Ok(())
    }

    async fn read_durable(&self) -> Result<Vec<Event>, CoreError> {
        Ok(read_json(self.store.as_ref(), keys::EVENT_LEDGER).await?)
    }
}

/// A session is active iff the latest Start has no Stop after it.
///
/// Events are ordered by timestamp, then by ledger position, so a Stop
/// recorded within the same second as its Start still closes it.
pub fn derive_active_session(events: &[Event]) -> bool {
    let order = |(index, event): &(usize, &Event)| (event.timestamp, *index);
    let Some(start) = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.kind == EventKind::Start)
        .max_by_key(order)
    else {
        return false;
    };
    let start_order = order(&start);
    !events
        .iter()
        .enumerate()
        .any(|entry| entry.1.kind == EventKind::Stop && order(&entry) > start_order)
}
