//! Contract assignments returned by the backend.

use serde::Deserialize;

use super::types::lenient_string;
use crate::error::CoreError;
use crate::tracking::event::{parse_timestamp, Event, Position};
use crate::tracking::event_log::EventLog;

/// Check-in date the backend uses for "never checked in".
pub const NOT_CHECKED_IN: &str = "0001-01-01T00:00:00";

/// One contract (lease) assigned to an employee.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Contract {
    #[serde(rename = "LeaseNo")]
    pub lease_no: String,
    #[serde(rename = "CustName", default)]
    pub customer_name: String,
    #[serde(rename = "CustAddress", default)]
    pub customer_address: Option<String>,
    #[serde(rename = "PhoneNo", default, deserialize_with = "lenient_string")]
    pub phone_no: Option<String>,
    #[serde(rename = "PoliceNo", default)]
    pub police_no: Option<String>,
    #[serde(rename = "EquipType", default)]
    pub equipment_type: Option<String>,
    #[serde(rename = "Unit", default, deserialize_with = "lenient_string")]
    pub unit: Option<String>,
    #[serde(rename = "AmountOd", default, deserialize_with = "lenient_string")]
    pub amount_overdue: Option<String>,
    #[serde(rename = "Overdue", default, deserialize_with = "lenient_string")]
    pub overdue: Option<String>,
    #[serde(rename = "DueDate", default)]
    pub due_date: Option<String>,
    #[serde(rename = "LastCallDate", default)]
    pub last_call_date: Option<String>,
    #[serde(rename = "LastCallName", default)]
    pub last_call_name: Option<String>,
    #[serde(rename = "LastNote", default)]
    pub last_note: Option<String>,
    #[serde(rename = "Comment", default)]
    pub comment: Option<String>,
    #[serde(rename = "Lattitude", default, deserialize_with = "lenient_string")]
    pub latitude: Option<String>,
    #[serde(rename = "Longtitude", default, deserialize_with = "lenient_string")]
    pub longitude: Option<String>,
    #[serde(rename = "CheckinDate", default)]
    pub checkin_date: Option<String>,
}

impl Contract {
    pub fn is_checked_in(&self) -> bool {
        self.checkin_date
            .as_deref()
            .is_some_and(|d| !d.is_empty() && !d.starts_with(NOT_CHECKED_IN))
    }

    /// Server-recorded check-in position, if both coordinates parse.
    pub fn checkin_position(&self) -> Option<Position> {
        let lat = self.latitude.as_deref()?.trim().parse::<f64>().ok()?;
        let lon = self.longitude.as_deref()?.trim().parse::<f64>().ok()?;
        let position = Position::new(lat, lon);
        (position.is_valid() && !(lat == 0.0 && lon == 0.0)).then_some(position)
    }

    /// Ledger event for a check-in the server already holds.
    pub fn checked_in_event(&self, employee_id: &str) -> Option<Event> {
        if !self.is_checked_in() {
            return None;
        }
        let timestamp = parse_timestamp(self.checkin_date.as_deref()?)?;
        let position = self.checkin_position()?;
        let mut event = Event::site_checkin(employee_id, &self.lease_no, position, timestamp)
            .with_contract_name(&self.customer_name);
        if let Some(comment) = self.comment.as_deref().filter(|c| !c.trim().is_empty()) {
            event = event.with_comment(comment);
        }
        Some(event)
    }
}

/// Add check-ins the server already holds to the ledger without sending them.
///
/// Returns how many were new to the ledger.
pub async fn import_checked_in(
    log: &EventLog,
    employee_id: &str,
    contracts: &[Contract],
) -> Result<usize, CoreError> {
    let events: Vec<Event> = contracts
        .iter()
        .filter_map(|c| c.checked_in_event(employee_id))
        .collect();
    if events.is_empty() {
        return Ok(0);
    }
    let added = log.import(events).await?;
    tracing::debug!(added, "server check-ins imported");
    Ok(added)
}
