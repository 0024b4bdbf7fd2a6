//! Tunables for the activation workflow.

use std::{path::Path, time::Duration};

use beacon_core::location::WatchOptions;
use serde::Deserialize;

/// Session configuration, deserialised from an optional TOML file and
/// `BEACON_*` environment variables. Every field has a default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
  /// How long the trigger must be held before it fires.
  pub dwell_ms:             u64,
  /// Upper bound on obtaining the initial fix.
  pub fix_timeout_ms:       u64,
  /// Upper bound on the contact fan-out (and on the local confirmation).
  pub notify_timeout_ms:    u64,
  pub watch_interval_ms:    u64,
  pub watch_min_distance_m: f64,
  /// Contacts beyond this count (after priority ordering) are not alerted.
  pub max_contacts:         usize,
  /// Leading text of the distress message.
  pub alert_prefix:         String,
  /// Whether the audible alarm starts when tracking begins.
  pub alarm_on_start:       bool,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      dwell_ms:             3_000,
      fix_timeout_ms:       15_000,
      notify_timeout_ms:    15_000,
      watch_interval_ms:    10_000,
      watch_min_distance_m: 10.0,
      max_contacts:         5,
      alert_prefix:         "EMERGENCY ALERT".to_owned(),
      alarm_on_start:       true,
    }
  }
}

impl SessionConfig {
  /// Layer `path` (if given; a missing file is not an error) and `BEACON_*`
  /// environment variables over the defaults.
  pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
      builder = builder.add_source(config::File::from(path).required(false));
    }
    builder
      .add_source(config::Environment::with_prefix("BEACON").try_parsing(true))
      .build()?
      .try_deserialize()
  }

  pub fn dwell(&self) -> Duration { Duration::from_millis(self.dwell_ms) }

  pub fn fix_timeout(&self) -> Duration { Duration::from_millis(self.fix_timeout_ms) }

  pub fn notify_timeout(&self) -> Duration {
    Duration::from_millis(self.notify_timeout_ms)
  }

  pub fn watch_options(&self) -> WatchOptions {
    WatchOptions {
      interval:       Duration::from_millis(self.watch_interval_ms),
      min_distance_m: self.watch_min_distance_m,
    }
  }
}
