//! Decides whether tracking is active from the ledger and the server.

use std::sync::Arc;

use super::event_log::EventLog;
use crate::api::NextAction;
use crate::capabilities::RemoteApi;

/// Where a [`TrackingStatus`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSource {
    Server,
    EventLog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingStatus {
    pub active: bool,
    pub source: StatusSource,
}

/// The server wins when it answered; otherwise the ledger decides.
pub fn resolve(log_active: bool, server: Option<NextAction>) -> TrackingStatus {
    match server {
        Some(next) => {
            if next.session_open() != log_active {
                tracing::info!(log_active, server = ?next, "server and ledger disagree, using server");
            }
            TrackingStatus {
                active: next.session_open(),
                source: StatusSource::Server,
            }
        }
        None => TrackingStatus {
            active: log_active,
            source: StatusSource::EventLog,
        },
    }
}

pub struct StateReconciler {
    log: Arc<EventLog>,
    remote: Arc<dyn RemoteApi>,
}

impl StateReconciler {
    pub fn new(log: Arc<EventLog>, remote: Arc<dyn RemoteApi>) -> Self {
        Self { log, remote }
    }

    /// Ledger-only status; never touches the network.
    pub async fn local_status(&self) -> TrackingStatus {
        resolve(self.log.derive_active_session().await, None)
    }

    /// Server-confirmed status, falling back to the ledger when offline.
    pub async fn status(&self, employee_id: &str) -> TrackingStatus {
        let server = match self.remote.query_next_action(employee_id).await {
            Ok(next) => Some(next),
            Err(e) => {
                tracing::warn!(error = %e, "next action unavailable, using ledger");
                None
            }
        };
        resolve(self.log.derive_active_session().await, server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_takes_precedence() {
        let status = resolve(true, Some(NextAction::Start));
        assert_eq!(
            status,
            TrackingStatus {
                active: false,
                source: StatusSource::Server
            }
        );
        assert!(resolve(false, Some(NextAction::Stop)).active);
    }

    #[test]
    fn ledger_is_the_fallback() {
        let status = resolve(true, None);
        assert!(status.active);
        assert_eq!(status.source, StatusSource::EventLog);
        assert!(!resolve(false, None).active);
    }
}
