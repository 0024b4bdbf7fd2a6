//! Error types for `beacon-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("location permission denied")]
  PermissionDenied,

  #[error("position unavailable: {0}")]
  PositionUnavailable(String),

  #[error("notification channel unavailable: {0}")]
  ChannelUnavailable(String),

  #[error("not a map link: {0:?}")]
  InvalidMapLink(String),

  #[error("unknown incident status: {0:?}")]
  UnknownStatus(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn messages_carry_the_reason() {
    assert_eq!(
      Error::ChannelUnavailable("sms gateway down".into()).to_string(),
      "notification channel unavailable: sms gateway down"
    );
    assert_eq!(
      Error::InvalidMapLink("https://example.com".into()).to_string(),
      "not a map link: \"https://example.com\""
    );
    assert_eq!(Error::PermissionDenied.to_string(), "location permission denied");
  }
}
