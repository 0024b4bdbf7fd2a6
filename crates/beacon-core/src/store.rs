//! The `IncidentStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `beacon-store-sqlite`).
//! The session controller depends on this abstraction, not on any concrete
//! backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  incident::{FixUpdate, Incident, NewIncident},
  location::LocationFix,
};

/// Abstraction over the durable incident record.
///
/// At most one incident per subject may be active at a time. Backends should
/// enforce this at their own level as well; the controller checks it before
/// every activation.
///
/// All methods return `Send` futures so the trait can be used from spawned
/// tokio tasks.
pub trait IncidentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Persist a new incident with `status = active`, `started_at = now` and
  /// `last_fix = initial_fix`. The id is allocated by the store.
  fn create(
    &self,
    input: NewIncident,
  ) -> impl Future<Output = Result<Incident, Self::Error>> + Send + '_;

  /// Retrieve an incident by id. Returns `None` if not found.
  fn get(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Incident>, Self::Error>> + Send + '_;

  /// The active incident for `subject_id`, if there is one.
  fn find_active(
    &self,
    subject_id: Uuid,
  ) -> impl Future<Output = Result<Option<Incident>, Self::Error>> + Send + '_;

  /// Every incident raised by `subject_id`, newest first.
  fn list_for_subject(
    &self,
    subject_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Incident>, Self::Error>> + Send + '_;

  /// Offer a watch fix. Only an active incident accepts it, and only if it is
  /// not older than the stored `last_fix`; rejections are no-ops reported
  /// through [`FixUpdate`], not errors.
  fn update_fix(
    &self,
    id: Uuid,
    fix: LocationFix,
  ) -> impl Future<Output = Result<FixUpdate, Self::Error>> + Send + '_;

  /// Mark the incident resolved and stamp `ended_at`. Resolving a resolved
  /// incident changes nothing and returns it as stored.
  fn resolve(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Incident, Self::Error>> + Send + '_;
}
