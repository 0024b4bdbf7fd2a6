//! Resources held while an incident is being tracked, and the task that
//! forwards watch fixes into the store.
//!
//! Everything acquired on entry to TRACKING lives in [`Tracking`]. Dropping
//! it stops the watch, silences the alarm and aborts the forwarder, so every
//! exit path (cancel, teardown, controller drop) releases the same way.

use std::sync::{Arc, Weak};

use beacon_core::{
  incident::{FixUpdate, Incident},
  location::{LocationFix, LocationProvider, WatchHandle},
  store::IncidentStore,
};
use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

use crate::{controller::Shared, feedback::AlarmGuard};

// ─── Watch guard ─────────────────────────────────────────────────────────────

/// Stops its watch when dropped.
pub(crate) struct WatchGuard<L: LocationProvider + 'static> {
  provider: Arc<L>,
  handle:   WatchHandle,
}

impl<L: LocationProvider + 'static> WatchGuard<L> {
  pub(crate) fn new(provider: Arc<L>, handle: WatchHandle) -> Self {
    Self { provider, handle }
  }
}

impl<L: LocationProvider + 'static> Drop for WatchGuard<L> {
  fn drop(&mut self) {
    self.provider.stop(&self.handle);
    tracing::debug!(watch = %self.handle.id(), "location watch stopped");
  }
}

// ─── Tracking resources ──────────────────────────────────────────────────────

/// Resources acquired for an incident but not yet owned by the controller.
pub(crate) struct PendingTracking<L: LocationProvider + 'static> {
  pub(crate) incident: Incident,
  pub(crate) updates:  mpsc::UnboundedReceiver<LocationFix>,
  pub(crate) watch:    Option<WatchGuard<L>>,
  pub(crate) alarm:    AlarmGuard,
}

impl<L: LocationProvider + 'static> PendingTracking<L> {
  /// Start forwarding buffered and future fixes. Called once the controller
  /// has committed to TRACKING, so no fix is judged against an earlier state.
  pub(crate) fn start<S>(self, shared: Weak<Shared<L>>, store: Arc<S>) -> Tracking<L>
  where
    S: IncidentStore + 'static,
  {
    let incident_id = self.incident.incident_id;
    let forwarder = tokio::spawn(forward_updates(shared, store, incident_id, self.updates));
    Tracking {
      incident: self.incident,
      watch: self.watch,
      alarm: self.alarm,
      forwarder,
    }
  }
}

pub(crate) struct Tracking<L: LocationProvider + 'static> {
  pub(crate) incident: Incident,
  pub(crate) watch:    Option<WatchGuard<L>>,
  pub(crate) alarm:    AlarmGuard,
  forwarder:           JoinHandle<()>,
}

impl<L: LocationProvider + 'static> Drop for Tracking<L> {
  fn drop(&mut self) { self.forwarder.abort(); }
}

// ─── Forwarding ──────────────────────────────────────────────────────────────

/// What happened to one watch fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Forwarded {
  Applied,
  /// The session had left TRACKING for this incident.
  Dropped,
  /// The store refused it.
  Rejected(FixUpdate),
  /// The store call failed; the next fix is tried independently.
  Failed,
}

async fn forward_updates<L, S>(
  shared: Weak<Shared<L>>,
  store: Arc<S>,
  incident_id: Uuid,
  mut updates: mpsc::UnboundedReceiver<LocationFix>,
) where
  L: LocationProvider + 'static,
  S: IncidentStore + 'static,
{
  while let Some(fix) = updates.recv().await {
    let Some(shared) = shared.upgrade() else {
      break;
    };
    forward_fix(&shared, store.as_ref(), incident_id, fix).await;
  }
}

/// Apply one fix if the session is still tracking `incident_id`.
///
/// The check and the store write happen under the session gate, which
/// `cancel` also takes before entering RESOLVING: a fix is either applied
/// completely before the resolve begins or not at all.
pub(crate) async fn forward_fix<L, S>(
  shared: &Shared<L>,
  store: &S,
  incident_id: Uuid,
  fix: LocationFix,
) -> Forwarded
where
  L: LocationProvider + 'static,
  S: IncidentStore,
{
  let _gate = shared.gate.lock().await;

  if !shared.is_tracking(incident_id) {
    shared.record_update(false);
    tracing::debug!(%incident_id, "fix dropped: session no longer tracking");
    return Forwarded::Dropped;
  }

  let outcome = match store.update_fix(incident_id, fix).await {
    Ok(FixUpdate::Applied) => Forwarded::Applied,
    Ok(rejected) => {
      tracing::debug!(%incident_id, ?rejected, "fix rejected by store");
      Forwarded::Rejected(rejected)
    }
    Err(e) => {
      tracing::warn!(%incident_id, error = %e, "failed to store location update");
      Forwarded::Failed
    }
  };
  shared.record_update(outcome == Forwarded::Applied);
  outcome
}
