//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings. Fixes and contact lists are
//! stored as compact JSON. UUIDs are stored as hyphenated lowercase strings.

use std::str::FromStr;

use beacon_core::{
  incident::{Incident, IncidentStatus},
  location::LocationFix,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── IncidentStatus ──────────────────────────────────────────────────────────

pub fn encode_status(status: IncidentStatus) -> &'static str { status.into() }

pub fn decode_status(s: &str) -> Result<IncidentStatus> {
  IncidentStatus::from_str(s)
    .map_err(|_| beacon_core::Error::UnknownStatus(s.to_owned()).into())
}

// ─── LocationFix ─────────────────────────────────────────────────────────────

pub fn encode_fix(fix: &LocationFix) -> Result<String> {
  Ok(serde_json::to_string(fix)?)
}

pub fn decode_fix(s: &str) -> Result<LocationFix> { Ok(serde_json::from_str(s)?) }

// ─── Contact ids ─────────────────────────────────────────────────────────────

pub fn encode_contacts(ids: &[Uuid]) -> Result<String> {
  Ok(serde_json::to_string(ids)?)
}

pub fn decode_contacts(s: &str) -> Result<Vec<Uuid>> { Ok(serde_json::from_str(s)?) }

// ─── Row type ────────────────────────────────────────────────────────────────

/// Column list matching the field order of [`RawIncident::from_row`].
pub const INCIDENT_COLUMNS: &str = "incident_id, subject_id, subject_name, \
  subject_contact, status, started_at, ended_at, initial_fix, last_fix, \
  notified_contacts";

/// Raw strings read directly from an `incidents` row.
pub struct RawIncident {
  pub incident_id:       String,
  pub subject_id:        String,
  pub subject_name:      String,
  pub subject_contact:   String,
  pub status:            String,
  pub started_at:        String,
  pub ended_at:          Option<String>,
  pub initial_fix:       String,
  pub last_fix:          String,
  pub notified_contacts: String,
}

impl RawIncident {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      incident_id:       row.get(0)?,
      subject_id:        row.get(1)?,
      subject_name:      row.get(2)?,
      subject_contact:   row.get(3)?,
      status:            row.get(4)?,
      started_at:        row.get(5)?,
      ended_at:          row.get(6)?,
      initial_fix:       row.get(7)?,
      last_fix:          row.get(8)?,
      notified_contacts: row.get(9)?,
    })
  }

  pub fn into_incident(self) -> Result<Incident> {
    Ok(Incident {
      incident_id:       decode_uuid(&self.incident_id)?,
      subject_id:        decode_uuid(&self.subject_id)?,
      subject_name:      self.subject_name,
      subject_contact:   self.subject_contact,
      status:            decode_status(&self.status)?,
      started_at:        decode_dt(&self.started_at)?,
      ended_at:          self.ended_at.as_deref().map(decode_dt).transpose()?,
      initial_fix:       decode_fix(&self.initial_fix)?,
      last_fix:          decode_fix(&self.last_fix)?,
      notified_contacts: decode_contacts(&self.notified_contacts)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_columns_are_literal_strings() {
    assert_eq!(encode_status(IncidentStatus::Active), "active");
    assert_eq!(encode_status(IncidentStatus::Resolved), "resolved");
    assert_eq!(decode_status("resolved").unwrap(), IncidentStatus::Resolved);
    assert!(matches!(
      decode_status("ACTIVE"),
      Err(Error::Core(beacon_core::Error::UnknownStatus(_)))
    ));
  }

  #[test]
  fn fix_column_keeps_full_precision() {
    let fix = LocationFix::new(40.41677541234, -3.70379021234, 3.5, 1_700_000_000_001);
    let back = decode_fix(&encode_fix(&fix).unwrap()).unwrap();
    assert_eq!(back, fix);
  }

  #[test]
  fn bad_timestamp_is_a_date_error() {
    assert!(matches!(decode_dt("yesterday"), Err(Error::DateParse(_))));
  }
}
