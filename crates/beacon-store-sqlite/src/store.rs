//! [`SqliteIncidentStore`], the SQLite implementation of [`IncidentStore`].

use std::path::Path;

use beacon_core::{
  incident::{FixUpdate, Incident, IncidentStatus, NewIncident},
  location::LocationFix,
  store::IncidentStore,
};
use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    INCIDENT_COLUMNS, RawIncident, encode_contacts, encode_dt, encode_fix, encode_status,
    encode_uuid,
  },
  schema::SCHEMA,
};

const ACTIVE: &str = "active";
const RESOLVED: &str = "resolved";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Beacon incident store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteIncidentStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteIncidentStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a `SELECT <columns> FROM incidents <clause>` with one text
  /// parameter and decode every row.
  async fn query_incidents(
    &self,
    clause: &'static str,
    param: String,
  ) -> Result<Vec<Incident>> {
    let raws: Vec<RawIncident> = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {INCIDENT_COLUMNS} FROM incidents {clause}");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![param], RawIncident::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawIncident::into_incident).collect()
  }
}

/// `true` if `err` is `incidents_one_active_idx` refusing a second active
/// incident for a subject. Other constraint failures (primary key, status
/// CHECK) are ordinary database errors.
fn is_active_conflict(err: &rusqlite::Error) -> bool {
  match err {
    rusqlite::Error::SqliteFailure(e, Some(msg)) => {
      e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        && msg.contains("incidents.subject_id")
    }
    _ => false,
  }
}

// ─── IncidentStore impl ──────────────────────────────────────────────────────

impl IncidentStore for SqliteIncidentStore {
  type Error = Error;

  async fn create(&self, input: NewIncident) -> Result<Incident> {
    let incident = Incident {
      incident_id:       Uuid::new_v4(),
      subject_id:        input.subject.subject_id,
      subject_name:      input.subject.name,
      subject_contact:   input.subject.contact,
      status:            IncidentStatus::Active,
      started_at:        Utc::now(),
      ended_at:          None,
      initial_fix:       input.initial_fix,
      last_fix:          input.initial_fix,
      notified_contacts: input.notified_contacts,
    };

    let id_str       = encode_uuid(incident.incident_id);
    let subject_str  = encode_uuid(incident.subject_id);
    let name         = incident.subject_name.clone();
    let contact      = incident.subject_contact.clone();
    let status_str   = encode_status(incident.status);
    let started_str  = encode_dt(incident.started_at);
    let fix_str      = encode_fix(&incident.initial_fix)?;
    let contacts_str = encode_contacts(&incident.notified_contacts)?;

    let inserted = self
      .conn
      .call(move |conn| {
        let result = conn.execute(
          "INSERT INTO incidents (
             incident_id, subject_id, subject_name, subject_contact, status,
             started_at, ended_at, initial_fix, last_fix, notified_contacts
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?7, ?8)",
          rusqlite::params![
            id_str,
            subject_str,
            name,
            contact,
            status_str,
            started_str,
            fix_str,
            contacts_str,
          ],
        );
        match result {
          Ok(_) => Ok(true),
          Err(e) if is_active_conflict(&e) => Ok(false),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    if !inserted {
      return Err(Error::SubjectAlreadyActive(incident.subject_id));
    }

    tracing::info!(
      incident_id = %incident.incident_id,
      subject_id = %incident.subject_id,
      "incident created"
    );
    Ok(incident)
  }

  async fn get(&self, id: Uuid) -> Result<Option<Incident>> {
    let mut found = self
      .query_incidents("WHERE incident_id = ?1", encode_uuid(id))
      .await?;
    Ok(found.pop())
  }

  async fn find_active(&self, subject_id: Uuid) -> Result<Option<Incident>> {
    let mut found = self
      .query_incidents(
        "WHERE subject_id = ?1 AND status = 'active'",
        encode_uuid(subject_id),
      )
      .await?;
    Ok(found.pop())
  }

  async fn list_for_subject(&self, subject_id: Uuid) -> Result<Vec<Incident>> {
    self
      .query_incidents(
        "WHERE subject_id = ?1 ORDER BY started_at DESC",
        encode_uuid(subject_id),
      )
      .await
  }

  async fn update_fix(&self, id: Uuid, fix: LocationFix) -> Result<FixUpdate> {
    let id_str  = encode_uuid(id);
    let fix_str = encode_fix(&fix)?;
    let ts      = fix.timestamp;

    let outcome: Option<FixUpdate> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let current: Option<(String, i64)> = tx
          .query_row(
            "SELECT status, json_extract(last_fix, '$.timestamp')
             FROM incidents WHERE incident_id = ?1",
            rusqlite::params![id_str],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
          .optional()?;

        let Some((status, last_ts)) = current else {
          return Ok(None);
        };

        let outcome = if status != ACTIVE {
          FixUpdate::IncidentResolved
        } else if ts < last_ts {
          FixUpdate::Stale
        } else {
          tx.execute(
            "UPDATE incidents SET last_fix = ?2
             WHERE incident_id = ?1 AND status = 'active'",
            rusqlite::params![id_str, fix_str],
          )?;
          FixUpdate::Applied
        };

        tx.commit()?;
        Ok(Some(outcome))
      })
      .await?;

    match outcome {
      None => Err(Error::IncidentNotFound(id)),
      Some(FixUpdate::Applied) => Ok(FixUpdate::Applied),
      Some(rejected) => {
        tracing::debug!(incident_id = %id, ?rejected, "fix update rejected");
        Ok(rejected)
      }
    }
  }

  async fn resolve(&self, id: Uuid) -> Result<Incident> {
    let id_str    = encode_uuid(id);
    let ended_str = encode_dt(Utc::now());

    // `None`: no such incident; `Some(true)`: this call resolved it.
    let transitioned: Option<bool> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let status: Option<String> = tx
          .query_row(
            "SELECT status FROM incidents WHERE incident_id = ?1",
            rusqlite::params![id_str],
            |r| r.get(0),
          )
          .optional()?;

        let Some(status) = status else {
          return Ok(None);
        };

        let changed = if status == ACTIVE {
          tx.execute(
            "UPDATE incidents SET status = ?2, ended_at = ?3
             WHERE incident_id = ?1 AND status = 'active'",
            rusqlite::params![id_str, RESOLVED, ended_str],
          )? == 1
        } else {
          false
        };

        tx.commit()?;
        Ok(Some(changed))
      })
      .await?;

    match transitioned {
      None => return Err(Error::IncidentNotFound(id)),
      Some(true) => tracing::info!(incident_id = %id, "incident resolved"),
      Some(false) => tracing::debug!(incident_id = %id, "incident already resolved"),
    }

    self.get(id).await?.ok_or(Error::IncidentNotFound(id))
  }
}
