//! Persisted queue of events whose transmission failed.
//!
//! Stored as a JSON array under [`keys::PENDING_QUEUE`], oldest first. Every
//! operation reads the durable copy, so a background process and the
//! foreground see the same queue.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::CoreError;
use crate::storage::{keys, read_json, write_json, LocalStore};
use crate::sync::types::PendingEvent;
use crate::tracking::event::Event;

pub struct PendingQueue {
    store: Arc<dyn LocalStore>,
    lock: Mutex<()>,
}

impl PendingQueue {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Queue an event for retry.
    ///
    /// Returns `false` when the event was already queued; its attempt count
    /// and last error are updated instead.
    pub async fn enqueue(
        &self,
        event: Event,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        if let Some(existing) = entries.iter_mut().find(|p| p.holds(&event)) {
            existing.attempts += 1;
            existing.last_error = Some(error.to_string());
            self.persist(&entries).await?;
            return Ok(false);
        }
        tracing::info!(kind = %event.kind, ts = %event.timestamp_string(), error, "event queued for retry");
        entries.push(PendingEvent::new(event, error, now));
        self.persist(&entries).await?;
        Ok(true)
    }

    /// Every queued entry, oldest first.
    pub async fn entries(&self) -> Result<Vec<PendingEvent>, CoreError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        entries.sort_by_key(|p| p.enqueued_at);
        Ok(entries)
    }

    pub async fn remove(&self, id: &str) -> Result<(), CoreError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        let before = entries.len();
        entries.retain(|p| p.id != id);
        if entries.len() != before {
            self.persist(&entries).await?;
        }
        Ok(())
    }

    pub async fn record_failure(&self, id: &str, error: &str) -> Result<(), CoreError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        if let Some(entry) = entries.iter_mut().find(|p| p.id == id) {
            entry.attempts += 1;
            entry.last_error = Some(error.to_string());
            self.persist(&entries).await?;
        }
        Ok(())
    }

    /// Note that the save step of the queued `event` succeeded, so a retry
    /// only repeats what is left.
    pub async fn mark_saved(&self, event: &Event) -> Result<(), CoreError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        if let Some(entry) = entries.iter_mut().find(|p| p.holds(event) && !p.saved) {
            entry.saved = true;
            self.persist(&entries).await?;
        }
        Ok(())
    }

    pub async fn len(&self) -> Result<usize, CoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool, CoreError> {
        Ok(self.len().await? == 0)
    }

    pub async fn clear(&self) -> Result<(), CoreError> {
        let _guard = self.lock.lock().await;
        self.store.remove(keys::PENDING_QUEUE).await?;
        Ok(())
    }

    async fn load(&self) -> Result<Vec<PendingEvent>, CoreError> {
        Ok(read_json(self.store.as_ref(), keys::PENDING_QUEUE).await?)
    }

    async fn persist(&self, entries: &[PendingEvent]) -> Result<(), CoreError> {
        write_json(self.store.as_ref(), keys::PENDING_QUEUE, entries).await
    }
}
