//! Location events recorded in the ledger.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine distance.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Format of event timestamps: local wall time, second precision.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance in metres.
    pub fn distance_m(&self, other: &Position) -> f64 {
        let lat1_rad = self.latitude.to_radians();
        let lat2_rad = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_M * c
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Semantic type of a recorded location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// User pressed Start.
    #[serde(rename = "start")]
    Start,
    /// User pressed Stop.
    #[serde(rename = "stop")]
    Stop,
    /// Arrival at a customer site for a contract.
    #[serde(rename = "kontrak")]
    SiteCheckin,
    /// Periodic background sample.
    #[serde(rename = "tracking")]
    Tracking,
}

impl EventKind {
    /// Tag used by the server and the persisted ledger.
    pub fn tag(&self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::Stop => "stop",
            EventKind::SiteCheckin => "kontrak",
            EventKind::Tracking => "tracking",
        }
    }

    /// Discrete, user-initiated kinds are never rate limited.
    pub fn is_user_initiated(&self) -> bool {
        !matches!(self, EventKind::Tracking)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// One immutable entry of the event ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub kind: EventKind,
    pub employee_id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(with = "local_timestamp")]
    pub timestamp: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Identity used to reject double insertion: `(contractId, kind, timestamp)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub contract_id: Option<String>,
    pub kind: EventKind,
    pub timestamp: NaiveDateTime,
}

impl Event {
    pub fn new(
        kind: EventKind,
        employee_id: impl Into<String>,
        position: Position,
        timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            kind,
            employee_id: employee_id.into(),
            latitude: position.latitude,
            longitude: position.longitude,
            timestamp,
            contract_id: None,
            contract_name: None,
            address: None,
            comment: None,
        }
    }

    /// Site check-in for a contract.
    pub fn site_checkin(
        employee_id: impl Into<String>,
        contract_id: impl Into<String>,
        position: Position,
        timestamp: NaiveDateTime,
    ) -> Self {
        let mut event = Self::new(EventKind::SiteCheckin, employee_id, position, timestamp);
        event.contract_id = Some(contract_id.into());
        event
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        let address = address.into();
        self.address = (!address.is_empty()).then_some(address);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_contract_name(mut self, name: impl Into<String>) -> Self {
        self.contract_name = Some(name.into());
        self
    }

    pub fn position(&self) -> Position {
        Position::new(self.latitude, self.longitude)
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            contract_id: self.contract_id.clone(),
            kind: self.kind,
            timestamp: self.timestamp,
        }
    }

    pub fn same_identity(&self, other: &Event) -> bool {
        self.contract_id == other.contract_id
            && self.kind == other.kind
            && self.timestamp == other.timestamp
    }

    /// Timestamp rendered the way the server and ledger expect it.
    pub fn timestamp_string(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Parse a ledger timestamp, tolerating a trailing fraction or `Z`.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim().trim_end_matches('Z');
    let seconds = trimmed.split('.').next().unwrap_or(trimmed);
    NaiveDateTime::parse_from_str(seconds, TIMESTAMP_FORMAT).ok()
}

pub(crate) mod local_timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{parse_timestamp, TIMESTAMP_FORMAT};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(raw: &str) -> NaiveDateTime {
        parse_timestamp(raw).unwrap()
    }

    #[test]
    fn kind_tags_match_ledger_format() {
        let json = serde_json::to_string(&EventKind::SiteCheckin).unwrap();
        assert_eq!(json, "\"kontrak\"");
        let kind: EventKind = serde_json::from_str("\"tracking\"").unwrap();
        assert_eq!(kind, EventKind::Tracking);
        assert!(!EventKind::Tracking.is_user_initiated());
        assert!(EventKind::Stop.is_user_initiated());
    }

    #[test]
    fn event_json_shape() {
        let event = Event::site_checkin("sales01", "L100", Position::new(-6.2, 106.8), ts("2025-07-01T09:30:00"))
            .with_comment("met the customer");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "kontrak");
        assert_eq!(json["employeeId"], "sales01");
        assert_eq!(json["contractId"], "L100");
        assert_eq!(json["timestamp"], "2025-07-01T09:30:00");
        assert!(json.get("address").is_none());

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn parse_timestamp_tolerates_fraction_and_zulu() {
        assert_eq!(ts("2025-07-01T09:30:00.123Z"), ts("2025-07-01T09:30:00"));
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn empty_address_is_dropped() {
        let event = Event::new(EventKind::Start, "e", Position::new(1.0, 1.0), ts("2025-07-01T08:00:00"))
            .with_address("");
        assert!(event.address.is_none());
    }

    #[test]
    fn haversine_distance() {
        let a = Position::new(-6.2000, 106.8166);
        let b = Position::new(-6.2010, 106.8166);
        let d = a.distance_m(&b);
        assert!((d - 111.2).abs() < 1.0, "got {d}");
        assert_eq!(a.distance_m(&a), 0.0);
    }

    #[test]
    fn dedup_identity_ignores_coordinates() {
        let at = ts("2025-07-01T09:30:00");
        let a = Event::site_checkin("e", "L100", Position::new(1.0, 1.0), at);
        let b = Event::site_checkin("e", "L100", Position::new(2.0, 2.0), at);
        assert!(a.same_identity(&b));
        assert_eq!(a.dedup_key(), b.dedup_key());
    }
}
