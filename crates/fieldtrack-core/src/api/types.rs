//! Wire types exchanged with the field-sales backend.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CoreError;
use crate::tracking::event::{Event, EventKind};

/// Status value the backend uses for success.
pub const STATUS_OK: i64 = 1;

/// Transport-level failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("HTTP {code}: {message}")]
    Status { code: u16, message: String },

    #[error("Server rejected request (status {status}): {message}")]
    Rejected { status: i64, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to encode request: {0}")]
    Encode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Foreground callers see a rejected credential as an expired session and
/// everything else as a network failure.
impl From<ApiError> for CoreError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized => CoreError::AuthExpired,
            other => CoreError::NetworkFailure(other.to_string()),
        }
    }
}

/// Common response envelope: `{ "Status": 1, "Message": "...", "Data": ... }`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerEnvelope<T> {
    #[serde(rename = "Status", default)]
    pub status: i64,
    #[serde(rename = "Message", default)]
    pub message: Option<String>,
    #[serde(rename = "Data", default = "Option::default")]
    pub data: Option<T>,
}

impl<T> ServerEnvelope<T> {
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    pub fn message_or_default(&self) -> String {
        self.message.clone().unwrap_or_default()
    }
}

/// Result of a transmitted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub ok: bool,
    pub server_status: i64,
    pub server_message: String,
}

/// Server's answer to "what should this employee's next button press be".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextAction {
    /// No open session: the next press starts one.
    Start,
    /// A session is open: the next press stops it.
    Stop,
}

impl NextAction {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "start" => Some(NextAction::Start),
            "stop" => Some(NextAction::Stop),
            _ => None,
        }
    }

    /// Whether the server believes a session is currently open.
    pub fn session_open(&self) -> bool {
        matches!(self, NextAction::Stop)
    }
}

/// Event as the backend expects it on the save-checkin endpoint.
///
/// Absent optional fields are omitted from the body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventPayload {
    #[serde(rename = "EmployeeName")]
    pub employee_name: String,
    #[serde(rename = "Lattitude")]
    pub latitude: String,
    #[serde(rename = "Longtitude")]
    pub longitude: String,
    #[serde(rename = "CreatedDate")]
    pub created_date: String,
    #[serde(rename = "Address", skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(rename = "tipechekin")]
    pub kind: String,
    #[serde(rename = "LeaseNo", skip_serializing_if = "Option::is_none")]
    pub lease_no: Option<String>,
    #[serde(rename = "Comment", skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl EventPayload {
    pub fn from_event(event: &Event) -> Self {
        let site = event.kind == EventKind::SiteCheckin;
        Self {
            employee_name: event.employee_id.clone(),
            latitude: event.latitude.to_string(),
            longitude: event.longitude.to_string(),
            created_date: event.timestamp_string(),
            address: event.address.clone(),
            kind: event.kind.tag().to_string(),
            lease_no: if site { event.contract_id.clone() } else { None },
            comment: if site { event.comment.clone() } else { None },
        }
    }

    pub fn is_site_checkin(&self) -> bool {
        self.kind == EventKind::SiteCheckin.tag()
    }
}

/// Body of the contract check-in update.
#[derive(Debug, Clone, Serialize)]
pub struct CheckinUpdate {
    #[serde(rename = "EmployeeName")]
    pub employee_name: String,
    #[serde(rename = "LeaseNo")]
    pub lease_no: String,
    #[serde(rename = "Comment", skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(rename = "Latitude")]
    pub latitude: String,
    #[serde(rename = "Longitude")]
    pub longitude: String,
    #[serde(rename = "CheckIn")]
    pub check_in: String,
    #[serde(rename = "CreatedDate")]
    pub created_date: String,
}

/// Body of a comment update on an already checked-in contract.
#[derive(Debug, Clone, Serialize)]
pub struct CommentUpdate {
    #[serde(rename = "EmployeeName")]
    pub employee_name: String,
    #[serde(rename = "LeaseNo")]
    pub lease_no: String,
    #[serde(rename = "Comment")]
    pub comment: String,
    #[serde(rename = "CreatedDate")]
    pub created_date: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct EmployeeQuery<'a> {
    #[serde(rename = "EmployeeName")]
    pub employee_name: &'a str,
    #[serde(rename = "LeaseNo", skip_serializing_if = "Option::is_none")]
    pub lease_no: Option<&'a str>,
}

/// Next-action payload: either a bare string or `{ "NextAction": "..." }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum NextActionData {
    Bare(String),
    Wrapped {
        #[serde(rename = "NextAction")]
        next_action: String,
    },
}

impl NextActionData {
    pub fn raw(&self) -> &str {
        match self {
            NextActionData::Bare(s) => s,
            NextActionData::Wrapped { next_action } => next_action,
        }
    }
}

/// Accept strings, numbers or null where the backend is inconsistent.
pub(crate) fn lenient_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::event::{parse_timestamp, Position};

    #[test]
    fn unauthorized_maps_to_expired_session() {
        assert!(matches!(CoreError::from(ApiError::Unauthorized), CoreError::AuthExpired));
        let err = CoreError::from(ApiError::Network("connection refused".into()));
        assert!(err.is_retryable());
    }

    #[test]
    fn tracking_payload_omits_site_fields() {
        let event = Event::new(
            EventKind::Tracking,
            "sales01",
            Position::new(-6.2, 106.8),
            parse_timestamp("2025-07-01T10:00:00").unwrap(),
        );
        let json = serde_json::to_value(EventPayload::from_event(&event)).unwrap();
        assert_eq!(json["EmployeeName"], "sales01");
        assert_eq!(json["Lattitude"], "-6.2");
        assert_eq!(json["Longtitude"], "106.8");
        assert_eq!(json["CreatedDate"], "2025-07-01T10:00:00");
        assert_eq!(json["tipechekin"], "tracking");
        assert!(json.get("LeaseNo").is_none());
        assert!(json.get("Address").is_none());
    }

    #[test]
    fn site_payload_carries_contract_fields() {
        let event = Event::site_checkin(
            "sales01",
            "L100",
            Position::new(1.0, 2.0),
            parse_timestamp("2025-07-01T10:00:00").unwrap(),
        )
        .with_address("Jl. Sudirman, Jakarta")
        .with_comment("ok");
        let payload = EventPayload::from_event(&event);
        assert!(payload.is_site_checkin());
        assert_eq!(payload.lease_no.as_deref(), Some("L100"));
        assert_eq!(payload.address.as_deref(), Some("Jl. Sudirman, Jakarta"));
        assert_eq!(payload.comment.as_deref(), Some("ok"));
    }

    #[test]
    fn envelope_parses_status_and_message() {
        let env: ServerEnvelope<serde_json::Value> =
            serde_json::from_str(r#"{"Status":0,"Message":"invalid lease"}"#).unwrap();
        assert!(!env.is_ok());
        assert_eq!(env.message_or_default(), "invalid lease");
        assert!(env.data.is_none());
    }

    #[test]
    fn next_action_accepts_both_shapes() {
        let bare: ServerEnvelope<NextActionData> =
            serde_json::from_str(r#"{"Status":1,"Data":"Stop"}"#).unwrap();
        assert_eq!(NextAction::parse(bare.data.unwrap().raw()), Some(NextAction::Stop));

        let wrapped: ServerEnvelope<NextActionData> =
            serde_json::from_str(r#"{"Status":1,"Data":{"NextAction":"start"}}"#).unwrap();
        assert_eq!(NextAction::parse(wrapped.data.unwrap().raw()), Some(NextAction::Start));
        assert!(NextAction::Stop.session_open());
    }
}
