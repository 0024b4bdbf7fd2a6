//! Integration tests for `SqliteIncidentStore` against an in-memory database.

use beacon_core::{
  contact::Subject,
  incident::{FixUpdate, IncidentStatus, NewIncident},
  location::LocationFix,
  store::IncidentStore,
};
use uuid::Uuid;

use crate::SqliteIncidentStore;

async fn store() -> SqliteIncidentStore {
  SqliteIncidentStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn subject() -> Subject { Subject::new("Alicia Romero", "+34611222333") }

fn fix(ts: i64) -> LocationFix { LocationFix::new(40.4167754, -3.7037902, 6.0, ts) }

fn new_incident(subject: &Subject) -> NewIncident {
  NewIncident::new(subject.clone(), fix(1_000), vec![Uuid::new_v4(), Uuid::new_v4()])
}

// ─── Creation ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_sets_active_and_copies_initial_fix() {
  let s = store().await;
  let subj = subject();
  let input = new_incident(&subj);
  let contacts = input.notified_contacts.clone();

  let incident = s.create(input).await.unwrap();
  assert_eq!(incident.status, IncidentStatus::Active);
  assert_eq!(incident.subject_id, subj.subject_id);
  assert_eq!(incident.subject_name, "Alicia Romero");
  assert_eq!(incident.initial_fix, fix(1_000));
  assert_eq!(incident.last_fix, fix(1_000));
  assert!(incident.ended_at.is_none());

  let fetched = s.get(incident.incident_id).await.unwrap().unwrap();
  assert_eq!(fetched.incident_id, incident.incident_id);
  assert_eq!(fetched.notified_contacts, contacts);
  assert_eq!(fetched.started_at, incident.started_at);
}

#[tokio::test]
async fn get_missing_returns_none() {
  let s = store().await;
  assert!(s.get(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn second_active_incident_for_subject_is_refused() {
  let s = store().await;
  let subj = subject();
  s.create(new_incident(&subj)).await.unwrap();

  let err = s.create(new_incident(&subj)).await.unwrap_err();
  assert!(matches!(err, crate::Error::SubjectAlreadyActive(id) if id == subj.subject_id));
  assert_eq!(s.list_for_subject(subj.subject_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn new_incident_allowed_after_resolve() {
  let s = store().await;
  let subj = subject();
  let first = s.create(new_incident(&subj)).await.unwrap();
  s.resolve(first.incident_id).await.unwrap();

  let second = s.create(new_incident(&subj)).await.unwrap();
  let active = s.find_active(subj.subject_id).await.unwrap().unwrap();
  assert_eq!(active.incident_id, second.incident_id);

  let history = s.list_for_subject(subj.subject_id).await.unwrap();
  assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn find_active_ignores_other_subjects() {
  let s = store().await;
  s.create(new_incident(&subject())).await.unwrap();
  assert!(s.find_active(Uuid::new_v4()).await.unwrap().is_none());
}

// ─── Fix updates ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn update_fix_overwrites_last_fix_only() {
  let s = store().await;
  let incident = s.create(new_incident(&subject())).await.unwrap();

  let moved = LocationFix::new(40.42, -3.70, 4.0, 2_000);
  let outcome = s.update_fix(incident.incident_id, moved).await.unwrap();
  assert_eq!(outcome, FixUpdate::Applied);

  let fetched = s.get(incident.incident_id).await.unwrap().unwrap();
  assert_eq!(fetched.last_fix, moved);
  assert_eq!(fetched.initial_fix, fix(1_000));
}

#[tokio::test]
async fn update_fix_rejects_older_timestamp() {
  let s = store().await;
  let incident = s.create(new_incident(&subject())).await.unwrap();
  s.update_fix(incident.incident_id, fix(5_000)).await.unwrap();

  let outcome = s.update_fix(incident.incident_id, fix(4_000)).await.unwrap();
  assert_eq!(outcome, FixUpdate::Stale);

  // Equal timestamps are not a regression.
  let same = LocationFix::new(1.0, 1.0, 1.0, 5_000);
  assert_eq!(
    s.update_fix(incident.incident_id, same).await.unwrap(),
    FixUpdate::Applied
  );

  let fetched = s.get(incident.incident_id).await.unwrap().unwrap();
  assert_eq!(fetched.last_fix, same);
}

#[tokio::test]
async fn update_fix_after_resolve_is_a_no_op() {
  let s = store().await;
  let incident = s.create(new_incident(&subject())).await.unwrap();
  s.resolve(incident.incident_id).await.unwrap();

  let outcome = s.update_fix(incident.incident_id, fix(9_000)).await.unwrap();
  assert_eq!(outcome, FixUpdate::IncidentResolved);

  let fetched = s.get(incident.incident_id).await.unwrap().unwrap();
  assert_eq!(fetched.last_fix, fix(1_000));
  assert_eq!(fetched.status, IncidentStatus::Resolved);
}

#[tokio::test]
async fn update_fix_unknown_incident_errors() {
  let s = store().await;
  let err = s.update_fix(Uuid::new_v4(), fix(1)).await.unwrap_err();
  assert!(matches!(err, crate::Error::IncidentNotFound(_)));
}

// ─── Resolution ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn resolve_sets_status_and_end_time() {
  let s = store().await;
  let incident = s.create(new_incident(&subject())).await.unwrap();

  let resolved = s.resolve(incident.incident_id).await.unwrap();
  assert_eq!(resolved.status, IncidentStatus::Resolved);
  let ended_at = resolved.ended_at.expect("ended_at set");
  assert!(ended_at >= resolved.started_at);
  assert!(s.find_active(incident.subject_id).await.unwrap().is_none());
}

#[tokio::test]
async fn resolve_is_idempotent() {
  let s = store().await;
  let incident = s.create(new_incident(&subject())).await.unwrap();

  let first = s.resolve(incident.incident_id).await.unwrap();
  tokio::time::sleep(std::time::Duration::from_millis(5)).await;
  let second = s.resolve(incident.incident_id).await.unwrap();

  assert_eq!(second.status, IncidentStatus::Resolved);
  assert_eq!(second.ended_at, first.ended_at);
}

#[tokio::test]
async fn resolve_unknown_incident_errors() {
  let s = store().await;
  let err = s.resolve(Uuid::new_v4()).await.unwrap_err();
  assert!(matches!(err, crate::Error::IncidentNotFound(_)));
}

// ─── Persistence ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn reopening_a_file_keeps_incidents() {
  let _ = tracing_subscriber::fmt().with_test_writer().try_init();

  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("incidents.db");
  let subj = subject();

  let id = {
    let s = SqliteIncidentStore::open(&path).await.unwrap();
    s.create(new_incident(&subj)).await.unwrap().incident_id
  };

  let s = SqliteIncidentStore::open(&path).await.unwrap();
  let active = s.find_active(subj.subject_id).await.unwrap().unwrap();
  assert_eq!(active.incident_id, id);
}
