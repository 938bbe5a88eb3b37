//! Daily route views over the ledger.

use chrono::NaiveDate;
use serde::Serialize;

use super::event::{Event, EventKind};

/// Events recorded on `date` (local time), oldest first.
pub fn events_on(events: &[Event], date: NaiveDate) -> Vec<Event> {
    let mut day: Vec<Event> = events
        .iter()
        .filter(|e| e.timestamp.date() == date)
        .cloned()
        .collect();
    day.sort_by_key(|e| e.timestamp);
    day
}

/// Drop points closer than `min_distance_m` to the previously kept point.
///
/// Start, Stop and site check-ins are always kept; only tracking samples
/// are thinned.
pub fn thin(events: &[Event], min_distance_m: f64) -> Vec<Event> {
    let mut kept: Vec<Event> = Vec::with_capacity(events.len());
    for event in events {
        let too_close = kept
            .last()
            .is_some_and(|prev| prev.position().distance_m(&event.position()) < min_distance_m);
        if event.kind == EventKind::Tracking && too_close {
            continue;
        }
        kept.push(event.clone());
    }
    kept
}

/// Summary of one day's route.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSummary {
    pub date: NaiveDate,
    pub points: usize,
    pub site_checkins: usize,
    pub distance_m: f64,
}

pub fn summarize(date: NaiveDate, route: &[Event]) -> RouteSummary {
    let distance_m = route
        .windows(2)
        .map(|pair| pair[0].position().distance_m(&pair[1].position()))
        .sum();
    RouteSummary {
        date,
        points: route.len(),
        site_checkins: route.iter().filter(|e| e.kind == EventKind::SiteCheckin).count(),
        distance_m,
    }
}

#[derive(Serialize)]
struct DayExport<'a> {
    summary: RouteSummary,
    events: &'a [Event],
}

/// Pretty JSON of a day's events with a summary header.
pub fn export_json(date: NaiveDate, events: &[Event]) -> Result<String, serde_json::Error> {
    let day = events_on(events, date);
    serde_json::to_string_pretty(&DayExport {
        summary: summarize(date, &day),
        events: &day,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::event::{parse_timestamp, Position};

    fn ev(kind: EventKind, lat: f64, ts: &str) -> Event {
        Event::new(kind, "sales01", Position::new(lat, 106.8), parse_timestamp(ts).unwrap())
    }

    #[test]
    fn day_filter_sorts_by_time() {
        let events = vec![
            ev(EventKind::Tracking, -6.21, "2025-07-01T11:00:00"),
            ev(EventKind::Start, -6.20, "2025-07-01T08:00:00"),
            ev(EventKind::Start, -6.20, "2025-07-02T08:00:00"),
        ];
        let day = events_on(&events, NaiveDate::from_ymd_opt(2025, 7, 1).unwrap());
        assert_eq!(day.len(), 2);
        assert_eq!(day[0].kind, EventKind::Start);
    }

    #[test]
    fn thinning_keeps_user_events() {
        let events = vec![
            ev(EventKind::Start, -6.20000, "2025-07-01T08:00:00"),
            ev(EventKind::Tracking, -6.20005, "2025-07-01T08:02:00"), // ~5 m
            ev(EventKind::Tracking, -6.20100, "2025-07-01T08:04:00"), // ~111 m
            ev(EventKind::Stop, -6.20101, "2025-07-01T08:06:00"),
        ];
        let thinned = thin(&events, 20.0);
        let kinds: Vec<EventKind> = thinned.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Start, EventKind::Tracking, EventKind::Stop]);
    }

    #[test]
    fn export_contains_summary_and_events() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        let events = vec![
            ev(EventKind::Start, -6.200, "2025-07-01T08:00:00"),
            ev(EventKind::Stop, -6.201, "2025-07-01T17:00:00"),
        ];
        let json: serde_json::Value = serde_json::from_str(&export_json(date, &events).unwrap()).unwrap();
        assert_eq!(json["summary"]["points"], 2);
        assert_eq!(json["summary"]["date"], "2025-07-01");
        assert!(json["summary"]["distanceM"].as_f64().unwrap() > 100.0);
        assert_eq!(json["events"][1]["kind"], "stop");
    }
}
