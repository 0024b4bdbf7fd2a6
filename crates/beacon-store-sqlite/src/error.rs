//! Error type for `beacon-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] beacon_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("incident not found: {0}")]
  IncidentNotFound(uuid::Uuid),

  /// The partial unique index refused a second active incident.
  #[error("subject {0} already has an active incident")]
  SubjectAlreadyActive(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
