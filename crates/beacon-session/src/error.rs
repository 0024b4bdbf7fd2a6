//! Error type for `beacon-session`.

use thiserror::Error;
use uuid::Uuid;

/// Why an activation (or a cancel / resume) did not go through.
///
/// A notification channel outage is not listed here: it never fails an
/// activation and is reported through
/// [`NotificationOutcome`](crate::NotificationOutcome) instead.
#[derive(Debug, Error)]
pub enum SessionError {
  #[error("location permission denied")]
  PermissionDenied,

  #[error("position unavailable: {0}")]
  PositionUnavailable(String),

  #[error("incident store error: {0}")]
  Persistence(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("an emergency is already active for subject {subject_id}")]
  ConcurrentEmergency {
    subject_id:  Uuid,
    /// The incident that blocks the activation, when known.
    incident_id: Option<Uuid>,
  },

  #[error("activation aborted before completion")]
  Aborted,
}

impl SessionError {
  /// Stable identifier for mapping errors to user-facing copy.
  pub fn code(&self) -> &'static str {
    match self {
      Self::PermissionDenied => "PERMISSION_DENIED",
      Self::PositionUnavailable(_) => "POSITION_UNAVAILABLE",
      Self::Persistence(_) => "PERSISTENCE_ERROR",
      Self::ConcurrentEmergency { .. } => "CONCURRENT_EMERGENCY",
      Self::Aborted => "ACTIVATION_ABORTED",
    }
  }

  pub(crate) fn persistence<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Persistence(Box::new(err))
  }

  /// Map a location provider failure onto the taxonomy. Anything that is not
  /// a permission refusal counts as the position being unavailable.
  pub(crate) fn from_location(err: beacon_core::Error) -> Self {
    match err {
      beacon_core::Error::PermissionDenied => Self::PermissionDenied,
      beacon_core::Error::PositionUnavailable(reason) => {
        Self::PositionUnavailable(reason)
      }
      other => Self::PositionUnavailable(other.to_string()),
    }
  }
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn location_errors_map_onto_taxonomy() {
    assert!(matches!(
      SessionError::from_location(beacon_core::Error::PermissionDenied),
      SessionError::PermissionDenied
    ));
    let err = SessionError::from_location(beacon_core::Error::ChannelUnavailable(
      "gps chip offline".into(),
    ));
    assert_eq!(err.code(), "POSITION_UNAVAILABLE");
  }

  #[test]
  fn display_and_codes() {
    let id = Uuid::nil();
    let err = SessionError::ConcurrentEmergency { subject_id: id, incident_id: None };
    assert_eq!(
      err.to_string(),
      "an emergency is already active for subject 00000000-0000-0000-0000-000000000000"
    );
    assert_eq!(err.code(), "CONCURRENT_EMERGENCY");
    assert_eq!(SessionError::Aborted.code(), "ACTIVATION_ABORTED");
  }
}
