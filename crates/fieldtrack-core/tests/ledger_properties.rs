//! Ledger and send-rule properties, end to end through EventLog and SyncEngine.

mod common;

use chrono::{Duration, NaiveDateTime};
use common::*;
use fieldtrack_core::storage::{LocalStore, MemoryStore, SqliteStore};
use fieldtrack_core::sync::{SendOutcome, SkipReason};
use fieldtrack_core::tracking::event::parse_timestamp;
use fieldtrack_core::tracking::{AppendOutcome, Event, EventKind, EventLog, Position};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

fn t0() -> NaiveDateTime {
    parse_timestamp("2025-07-01T10:00:00").unwrap()
}

fn kind_strategy() -> impl Strategy<Value = EventKind> {
    prop_oneof![
        Just(EventKind::Start),
        Just(EventKind::Stop),
        Just(EventKind::SiteCheckin),
        Just(EventKind::Tracking),
    ]
}

fn event_strategy() -> impl Strategy<Value = Event> {
    (
        kind_strategy(),
        prop::option::of(prop::sample::select(vec!["L100", "L200", "L300"])),
        0i64..20,
        -90.0f64..90.0,
        -180.0f64..180.0,
    )
        .prop_map(|(kind, contract, offset, lat, lon)| {
            let mut event = Event::new(kind, EMPLOYEE, Position::new(lat, lon), t0() + Duration::seconds(offset));
            event.contract_id = contract.map(str::to_string);
            event
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn ledger_holds_one_event_per_identity(events in prop::collection::vec(event_strategy(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let log = EventLog::load(Arc::new(MemoryStore::new())).await.unwrap();
            let mut seen = HashSet::new();
            for event in &events {
                let before = log.len().await;
                let outcome = log.append(event.clone()).await.unwrap();
                let fresh = seen.insert(event.dedup_key());
                prop_assert_eq!(outcome == AppendOutcome::Inserted, fresh);
                prop_assert!(log.len().await <= before + 1);
            }
            prop_assert_eq!(log.len().await, seen.len());
            Ok(())
        })?;
    }

    #[test]
    fn session_is_open_iff_last_toggle_is_start(toggles in prop::collection::vec(any::<bool>(), 1..20)) {
        let events: Vec<Event> = toggles
            .iter()
            .enumerate()
            .map(|(i, is_start)| {
                let kind = if *is_start { EventKind::Start } else { EventKind::Stop };
                Event::new(kind, EMPLOYEE, jakarta(), t0() + Duration::minutes(i as i64))
            })
            .collect();
        let last_start = toggles.iter().rposition(|s| *s);
        let last_stop = toggles.iter().rposition(|s| !*s);
        let expected = match (last_start, last_stop) {
            (Some(start), Some(stop)) => start > stop,
            (Some(_), None) => true,
            _ => false,
        };
        prop_assert_eq!(fieldtrack_core::tracking::derive_active_session(&events), expected);
    }
}

#[tokio::test]
async fn start_stop_scenario_with_guarded_sample() {
    let rig = Rig::new().await;
    let log = rig.engine().event_log().clone();
    let here = Position::new(1.0, 1.0);

    let start = Event::new(EventKind::Start, EMPLOYEE, here, t0());
    assert_eq!(rig.engine().record(start).await.unwrap(), SendOutcome::Sent);
    assert!(log.derive_active_session().await);

    let early = Event::new(EventKind::Tracking, EMPLOYEE, here, t0() + Duration::seconds(5));
    assert_eq!(
        rig.engine().record(early).await.unwrap(),
        SendOutcome::Skipped(SkipReason::StartGuardWindow)
    );

    let stop = Event::new(EventKind::Stop, EMPLOYEE, here, t0() + Duration::minutes(10));
    assert_eq!(rig.engine().record(stop).await.unwrap(), SendOutcome::Sent);
    assert!(!log.derive_active_session().await);

    assert_eq!(rig.remote.sent_kinds(), vec!["start", "stop"]);
}

#[tokio::test]
async fn duplicate_site_checkins_store_one_event() {
    let rig = Rig::new().await;
    let first = Event::site_checkin(EMPLOYEE, "L100", jakarta(), t0());
    let second = Event::site_checkin(EMPLOYEE, "L100", Position::new(-6.3, 106.9), t0());

    assert_eq!(rig.engine().record(first).await.unwrap(), SendOutcome::Sent);
    assert_eq!(
        rig.engine().record(second).await.unwrap(),
        SendOutcome::Skipped(SkipReason::AlreadyRecorded)
    );
    assert_eq!(rig.engine().event_log().len().await, 1);
    assert_eq!(rig.remote.sent().len(), 1);
}

#[tokio::test]
async fn transport_failure_retries_without_duplication() {
    let rig = Rig::new().await;
    rig.remote.fail_next(2);
    let sample = Event::new(EventKind::Tracking, EMPLOYEE, jakarta(), t0());

    assert!(matches!(rig.engine().record(sample).await.unwrap(), SendOutcome::Queued(_)));
    let report = rig.engine().flush_pending().await.unwrap();
    assert_eq!((report.sent, report.still_pending), (0, 1));

    let report = rig.engine().flush_pending().await.unwrap();
    assert_eq!((report.sent, report.still_pending), (1, 0));
    assert_eq!(rig.engine().pending().len().await.unwrap(), 0);

    // Two failed attempts, one success, nothing sent twice.
    assert_eq!(rig.remote.sent().len(), 3);
    assert_eq!(rig.engine().flush_pending().await.unwrap().sent, 0);
    assert_eq!(rig.remote.sent().len(), 3);
    assert_eq!(rig.engine().event_log().len().await, 1);
}

#[tokio::test]
async fn ledger_survives_restart_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fieldtrack.db");

    {
        let store: Arc<dyn LocalStore> = Arc::new(SqliteStore::open_at(&path).unwrap());
        let log = EventLog::load(store).await.unwrap();
        log.append(Event::new(EventKind::Start, EMPLOYEE, jakarta(), t0())).await.unwrap();
        log.append(Event::site_checkin(EMPLOYEE, "L100", jakarta(), t0() + Duration::minutes(30)))
            .await
            .unwrap();
    }

    let store: Arc<dyn LocalStore> = Arc::new(SqliteStore::open_at(&path).unwrap());
    let log = EventLog::load(store).await.unwrap();
    assert_eq!(log.len().await, 2);
    assert!(log.derive_active_session().await);
    let again = Event::site_checkin(EMPLOYEE, "L100", jakarta(), t0() + Duration::minutes(30));
    assert_eq!(log.append(again).await.unwrap(), AppendOutcome::DuplicateSkipped);
}
