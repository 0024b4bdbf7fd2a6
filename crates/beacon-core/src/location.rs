//! Location readings and the [`LocationProvider`] abstraction over the
//! device's positioning service.

use std::{future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

// ─── Fix ─────────────────────────────────────────────────────────────────────

/// A single position reading. Value type: two fixes are ordered only by
/// `timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
  pub latitude:  f64,
  pub longitude: f64,
  /// Horizontal accuracy radius in meters.
  pub accuracy:  f32,
  /// Epoch milliseconds.
  pub timestamp: i64,
}

impl LocationFix {
  pub fn new(latitude: f64, longitude: f64, accuracy: f32, timestamp: i64) -> Self {
    Self { latitude, longitude, accuracy, timestamp }
  }

  pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(self.timestamp)
  }

  /// Great-circle distance in meters (haversine).
  pub fn distance_to(&self, other: &LocationFix) -> f64 {
    let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (other.longitude - self.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
      + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
  }

  /// `true` if `self` is not older than `other`.
  pub fn is_not_older_than(&self, other: &LocationFix) -> bool {
    self.timestamp >= other.timestamp
  }
}

// ─── Permission ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
  Granted,
  Denied,
  Undetermined,
}

impl PermissionStatus {
  pub fn is_granted(self) -> bool { matches!(self, Self::Granted) }
}

// ─── Watch ───────────────────────────────────────────────────────────────────

/// Sampling thresholds for a continuous watch. A fix is delivered when
/// either threshold is met.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
  pub interval:       Duration,
  pub min_distance_m: f64,
}

impl Default for WatchOptions {
  fn default() -> Self {
    Self { interval: Duration::from_secs(10), min_distance_m: 10.0 }
  }
}

/// Opaque handle identifying a running watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchHandle(Uuid);

impl WatchHandle {
  pub fn new() -> Self { Self(Uuid::new_v4()) }

  pub fn id(&self) -> Uuid { self.0 }
}

impl Default for WatchHandle {
  fn default() -> Self { Self::new() }
}

/// Receives each fix delivered by a watch.
pub type FixCallback = Arc<dyn Fn(LocationFix) + Send + Sync>;

/// Applies [`WatchOptions`] to a raw stream of readings, for providers whose
/// platform API delivers every fix.
#[derive(Debug, Clone)]
pub struct WatchFilter {
  options: WatchOptions,
  last:    Option<LocationFix>,
}

impl WatchFilter {
  pub fn new(options: WatchOptions) -> Self { Self { options, last: None } }

  /// Returns `true` and remembers `fix` if it should be delivered.
  pub fn accept(&mut self, fix: LocationFix) -> bool {
    let Some(last) = self.last else {
      self.last = Some(fix);
      return true;
    };
    if !fix.is_not_older_than(&last) {
      return false;
    }

    let elapsed_ms = u128::try_from(fix.timestamp - last.timestamp).unwrap_or(0);
    let due = elapsed_ms >= self.options.interval.as_millis()
      || fix.distance_to(&last) >= self.options.min_distance_m;
    if due {
      self.last = Some(fix);
    }
    due
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the device's positioning service.
///
/// Errors are reported as [`crate::Error::PermissionDenied`] or
/// [`crate::Error::PositionUnavailable`].
pub trait LocationProvider: Send + Sync {
  /// Ask for foreground location permission. Idempotent: asking again after
  /// a decision returns the same decision.
  fn request_permission(
    &self,
  ) -> impl Future<Output = Result<PermissionStatus>> + Send + '_;

  /// Obtain a single high-accuracy fix.
  fn current_fix(&self) -> impl Future<Output = Result<LocationFix>> + Send + '_;

  /// Start a background watch. `on_update` is called once for every fix that
  /// meets either threshold in `options`, until [`Self::stop`] is called.
  fn watch(
    &self,
    options: WatchOptions,
    on_update: FixCallback,
  ) -> impl Future<Output = Result<WatchHandle>> + Send + '_;

  /// Stop delivery for `handle`. Safe to call repeatedly or on a handle that
  /// has already stopped.
  fn stop(&self, handle: &WatchHandle);
}
