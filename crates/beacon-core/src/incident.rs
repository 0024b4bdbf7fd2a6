//! The incident record, the durable trace of one emergency.
//!
//! An incident starts `active`, moves to `resolved` exactly once and never
//! back. While active only `last_fix` changes; everything else is fixed at
//! creation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{contact::Subject, location::LocationFix};

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum IncidentStatus {
  Active,
  Resolved,
}

impl IncidentStatus {
  pub fn is_active(self) -> bool { matches!(self, Self::Active) }
}

// ─── Incident ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
  /// Store-assigned; never changes.
  pub incident_id:       Uuid,
  pub subject_id:        Uuid,
  pub subject_name:      String,
  pub subject_contact:   String,
  pub status:            IncidentStatus,
  pub started_at:        DateTime<Utc>,
  /// Set once, on the transition to [`IncidentStatus::Resolved`].
  pub ended_at:          Option<DateTime<Utc>>,
  pub initial_fix:       LocationFix,
  pub last_fix:          LocationFix,
  /// Contacts the distress message was addressed to, in fan-out order.
  pub notified_contacts: Vec<Uuid>,
}

impl Incident {
  pub fn is_active(&self) -> bool { self.status.is_active() }

  /// How long the emergency has been (or was) running.
  pub fn duration(&self, now: DateTime<Utc>) -> Duration {
    let end = self.ended_at.unwrap_or(now);
    (end - self.started_at).to_std().unwrap_or_default()
  }
}

// ─── NewIncident ─────────────────────────────────────────────────────────────

/// Input to [`crate::store::IncidentStore::create`]. Id, status and
/// timestamps are always set by the store.
#[derive(Debug, Clone)]
pub struct NewIncident {
  pub subject:           Subject,
  pub initial_fix:       LocationFix,
  pub notified_contacts: Vec<Uuid>,
}

impl NewIncident {
  pub fn new(
    subject: Subject,
    initial_fix: LocationFix,
    notified_contacts: Vec<Uuid>,
  ) -> Self {
    Self { subject, initial_fix, notified_contacts }
  }
}

// ─── Update outcome ──────────────────────────────────────────────────────────

/// Result of offering a watch fix to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixUpdate {
  /// `last_fix` now holds the offered fix.
  Applied,
  /// The incident is resolved; its `last_fix` is frozen.
  IncidentResolved,
  /// The offered fix is older than the stored `last_fix`.
  Stale,
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use chrono::TimeZone;

  use super::*;

  fn incident(status: IncidentStatus) -> Incident {
    let fix = LocationFix::new(19.4326, -99.1332, 8.0, 1_700_000_000_000);
    Incident {
      incident_id: Uuid::new_v4(),
      subject_id: Uuid::new_v4(),
      subject_name: "Lucía".into(),
      subject_contact: "+525500000000".into(),
      status,
      started_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
      ended_at: None,
      initial_fix: fix,
      last_fix: fix,
      notified_contacts: vec![],
    }
  }

  #[test]
  fn status_serializes_as_lowercase_literals() {
    assert_eq!(
      serde_json::to_string(&IncidentStatus::Active).unwrap(),
      "\"active\""
    );
    assert_eq!(IncidentStatus::Resolved.to_string(), "resolved");
    assert_eq!(
      IncidentStatus::from_str("resolved").unwrap(),
      IncidentStatus::Resolved
    );
    assert!(IncidentStatus::from_str("closed").is_err());
  }

  #[test]
  fn duration_runs_until_ended() {
    let mut inc = incident(IncidentStatus::Active);
    let now = inc.started_at + chrono::Duration::seconds(95);
    assert_eq!(inc.duration(now), Duration::from_secs(95));

    inc.status = IncidentStatus::Resolved;
    inc.ended_at = Some(inc.started_at + chrono::Duration::seconds(30));
    assert_eq!(inc.duration(now), Duration::from_secs(30));
  }

  #[test]
  fn incident_json_shape() {
    let inc = incident(IncidentStatus::Active);
    let json = serde_json::to_value(&inc).unwrap();
    assert_eq!(json["status"], "active");
    assert_eq!(json["last_fix"]["timestamp"], 1_700_000_000_000_i64);
    assert!(json["ended_at"].is_null());
  }
}
