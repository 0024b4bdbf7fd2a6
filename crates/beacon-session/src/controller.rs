//! [`EmergencySessionController`]: the state machine that owns one
//! emergency from activation to resolution.
//!
//! ```text
//! IDLE ─activate─▶ ACQUIRING_LOCATION ─fix─▶ NOTIFYING ─dispatched─▶ TRACKING ⟲ fix
//!  ▲                      │                      │                      │
//!  ├──── failure ─────────┴──────────────────────┘                      │ cancel
//!  └─────────────────────────── RESOLVING ◀─────────────────────────────┘
//! ```
//!
//! Only the controller mutates session state. Watch fixes arrive on a
//! separate task and are applied only while the session is TRACKING the
//! incident they belong to; once RESOLVING is entered, resolve wins.

use std::{
  sync::{Arc, Mutex, MutexGuard, PoisonError},
  time::Duration,
};

use beacon_core::{
  contact::{Contact, Subject, prioritized_contacts},
  incident::{Incident, NewIncident},
  location::{FixCallback, LocationFix, LocationProvider},
  notify::{DeliveryReport, NotificationDispatcher, distress_message},
  store::IncidentStore,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::{
  SessionConfig,
  error::{Result, SessionError},
  feedback::{AlarmGuard, Feedback, NoFeedback},
  tracking::{PendingTracking, Tracking, WatchGuard},
};

const CONFIRM_TITLE: &str = "Emergency activated";

// ─── Public types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
  Idle,
  AcquiringLocation,
  Notifying,
  Tracking,
  Resolving,
}

impl SessionState {
  fn is_activating(self) -> bool {
    matches!(self, Self::AcquiringLocation | Self::Notifying)
  }
}

/// How the contact fan-out went. None of these fail an activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
  /// The channel accepted the fan-out; the report may still list failures.
  Sent(DeliveryReport),
  /// The channel was down or did not answer in time.
  ChannelUnavailable(String),
  /// The subject has no emergency contacts.
  NoContacts,
}

impl NotificationOutcome {
  pub fn delivered(&self) -> &[Uuid] {
    match self {
      Self::Sent(report) => &report.delivered,
      _ => &[],
    }
  }

  pub fn is_fully_delivered(&self) -> bool {
    matches!(self, Self::Sent(report) if report.is_complete())
  }
}

/// Result of a successful activation.
#[derive(Debug, Clone)]
pub struct Activation {
  pub incident:      Incident,
  pub fix:           LocationFix,
  pub notification:  NotificationOutcome,
  /// `false` if the location watch could not be started; the incident keeps
  /// its initial fix until a resume succeeds.
  pub tracking_live: bool,
}

/// Point-in-time view of the session, for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
  pub state:           SessionState,
  pub incident_id:     Option<Uuid>,
  pub started_at:      Option<DateTime<Utc>>,
  pub elapsed:         Option<Duration>,
  pub alarm_on:        bool,
  pub tracking_live:   bool,
  pub updates_applied: u64,
  pub updates_dropped: u64,
}

// ─── Shared state ────────────────────────────────────────────────────────────

pub(crate) struct Inner<L: LocationProvider + 'static> {
  state:           SessionState,
  /// Bumped by every claim so a stale activation cannot touch a newer one.
  attempt:         u64,
  abort:           Option<oneshot::Sender<()>>,
  tracking:        Option<Tracking<L>>,
  updates_applied: u64,
  updates_dropped: u64,
}

/// State shared between the controller and its forwarder task.
pub(crate) struct Shared<L: LocationProvider + 'static> {
  inner:           Mutex<Inner<L>>,
  /// Serialises applying a watch fix against entering RESOLVING.
  pub(crate) gate: tokio::sync::Mutex<()>,
}

impl<L: LocationProvider + 'static> Shared<L> {
  fn new() -> Self {
    Self {
      inner: Mutex::new(Inner {
        state:           SessionState::Idle,
        attempt:         0,
        abort:           None,
        tracking:        None,
        updates_applied: 0,
        updates_dropped: 0,
      }),
      gate:  tokio::sync::Mutex::new(()),
    }
  }

  fn lock(&self) -> MutexGuard<'_, Inner<L>> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub(crate) fn is_tracking(&self, incident_id: Uuid) -> bool {
    let inner = self.lock();
    inner.state == SessionState::Tracking
      && inner
        .tracking
        .as_ref()
        .is_some_and(|t| t.incident.incident_id == incident_id)
  }

  pub(crate) fn record_update(&self, applied: bool) {
    let mut inner = self.lock();
    if applied {
      inner.updates_applied += 1;
    } else {
      inner.updates_dropped += 1;
    }
  }

  /// Release every session resource and return to IDLE, leaving any tracked
  /// incident active in the store. A resolve already in progress finishes on
  /// its own.
  fn release(&self, reason: &'static str) -> Option<Uuid> {
    let (previous, tracking) = {
      let mut inner = self.lock();
      let previous = inner.state;
      inner.abort = None;
      if previous != SessionState::Resolving {
        inner.state = SessionState::Idle;
      }
      (previous, inner.tracking.take())
    };

    let left_active = tracking.as_ref().map(|t| t.incident.incident_id);
    drop(tracking);

    if previous != SessionState::Idle {
      tracing::info!(state = %previous, ?left_active, reason, "session released");
    }
    left_active
  }
}

/// An activation's hold on the session. Dropping an armed claim (error,
/// abort, or the caller dropping the future) returns the session to IDLE.
struct Claim<'a, L: LocationProvider + 'static> {
  shared:  &'a Shared<L>,
  attempt: u64,
  armed:   bool,
}

impl<L: LocationProvider + 'static> Claim<'_, L> {
  fn is_current(&self, inner: &Inner<L>) -> bool {
    inner.attempt == self.attempt && inner.state.is_activating()
  }

  fn enter(&self, next: SessionState) -> Result<()> {
    let mut inner = self.shared.lock();
    if !self.is_current(&inner) {
      return Err(SessionError::Aborted);
    }
    inner.state = next;
    inner.abort = None;
    Ok(())
  }

  /// Fail with `Aborted` once the session has been released or claimed
  /// again, so nothing more is started for `incident_id`.
  fn ensure_live(&self, incident_id: Uuid) -> Result<()> {
    if self.is_current(&self.shared.lock()) {
      return Ok(());
    }
    tracing::warn!(%incident_id, "session released during activation; incident left active");
    Err(SessionError::Aborted)
  }
}

impl<L: LocationProvider + 'static> Drop for Claim<'_, L> {
  fn drop(&mut self) {
    if !self.armed {
      return;
    }
    let mut inner = self.shared.lock();
    if self.is_current(&inner) {
      inner.state = SessionState::Idle;
      inner.abort = None;
    }
  }
}

/// Returns a RESOLVING session to IDLE when the cancel finishes, however it
/// finishes.
struct ResolvingReset<'a, L: LocationProvider + 'static>(&'a Shared<L>);

impl<L: LocationProvider + 'static> Drop for ResolvingReset<'_, L> {
  fn drop(&mut self) {
    let mut inner = self.0.lock();
    if inner.state == SessionState::Resolving {
      inner.state = SessionState::Idle;
    }
  }
}

// ─── Controller ──────────────────────────────────────────────────────────────

/// Orchestrates one emergency at a time for the embedding application.
///
/// Dropping the controller releases the watch and alarm but leaves an
/// active incident active in the store, where [`Self::resume`] can pick it
/// up again.
pub struct EmergencySessionController<L, N, S>
where
  L: LocationProvider + 'static,
  N: NotificationDispatcher + 'static,
  S: IncidentStore + 'static,
{
  location: Arc<L>,
  notifier: Arc<N>,
  store:    Arc<S>,
  feedback: Arc<dyn Feedback>,
  config:   SessionConfig,
  shared:   Arc<Shared<L>>,
}

impl<L, N, S> EmergencySessionController<L, N, S>
where
  L: LocationProvider + 'static,
  N: NotificationDispatcher + 'static,
  S: IncidentStore + 'static,
{
  pub fn new(location: Arc<L>, notifier: Arc<N>, store: Arc<S>, config: SessionConfig) -> Self {
    Self {
      location,
      notifier,
      store,
      feedback: Arc::new(NoFeedback),
      config,
      shared: Arc::new(Shared::new()),
    }
  }

  /// Route alarm feedback to `feedback` instead of discarding it.
  pub fn with_feedback(mut self, feedback: Arc<dyn Feedback>) -> Self {
    self.feedback = feedback;
    self
  }

  pub fn config(&self) -> &SessionConfig { &self.config }

  pub fn state(&self) -> SessionState { self.shared.lock().state }

  pub fn snapshot(&self) -> SessionSnapshot {
    let inner = self.shared.lock();
    let tracking = inner.tracking.as_ref();
    SessionSnapshot {
      state:           inner.state,
      incident_id:     tracking.map(|t| t.incident.incident_id),
      started_at:      tracking.map(|t| t.incident.started_at),
      elapsed:         tracking.map(|t| t.incident.duration(Utc::now())),
      alarm_on:        tracking.is_some_and(|t| t.alarm.is_on()),
      tracking_live:   tracking.is_some_and(|t| t.watch.is_some()),
      updates_applied: inner.updates_applied,
      updates_dropped: inner.updates_dropped,
    }
  }

  // ── Activation ──────────────────────────────────────────────────────────

  /// Run the full activation: locate, record, alert, start tracking.
  ///
  /// Fails without creating anything if another emergency is active, if
  /// location is refused or unavailable, or if the activation is aborted
  /// while locating. A store failure on create also fails the activation.
  /// A messaging outage does not; it is reported in
  /// [`Activation::notification`].
  pub async fn activate(&self, subject: &Subject, contacts: &[Contact]) -> Result<Activation> {
    let subject_id = subject.subject_id;
    let (claim, abort) = self.claim(subject_id)?;
    tracing::info!(%subject_id, "emergency activation started");

    let fix = tokio::select! {
      biased;
      _ = abort => {
        tracing::info!(%subject_id, "activation aborted while locating");
        return Err(SessionError::Aborted);
      }
      located = self.locate(subject_id) => located?,
    };

    claim.enter(SessionState::Notifying)?;

    let targets = prioritized_contacts(contacts, self.config.max_contacts);
    let notified = targets.iter().map(|c| c.contact_id).collect();
    let input = NewIncident::new(subject.clone(), fix, notified);
    let incident = match self.store.create(input).await {
      Ok(incident) => incident,
      Err(e) => return Err(self.create_failed(subject_id, e).await),
    };
    let incident_id = incident.incident_id;

    claim.ensure_live(incident_id)?;
    let notification = self.dispatch(subject, &fix, &targets).await;
    claim.ensure_live(incident_id)?;
    self.confirm_local(&notification).await;
    claim.ensure_live(incident_id)?;

    let pending = self.prepare_tracking(incident.clone()).await;
    let tracking_live = pending.watch.is_some();
    self.commit(claim, pending)?;

    tracing::info!(
      incident_id = %incident.incident_id,
      %subject_id,
      tracking_live,
      "emergency active; tracking started"
    );
    Ok(Activation { incident, fix, notification, tracking_live })
  }

  /// Back out of an activation that is still waiting for its first fix.
  /// Returns `false` if there is nothing to abort.
  pub fn abort_activation(&self) -> bool {
    let mut inner = self.shared.lock();
    if inner.state != SessionState::AcquiringLocation {
      return false;
    }
    inner.state = SessionState::Idle;
    inner.abort.take().is_some_and(|tx| tx.send(()).is_ok())
  }

  fn claim(&self, subject_id: Uuid) -> Result<(Claim<'_, L>, oneshot::Receiver<()>)> {
    let mut inner = self.shared.lock();
    if inner.state != SessionState::Idle {
      let incident_id = inner.tracking.as_ref().map(|t| t.incident.incident_id);
      tracing::warn!(%subject_id, state = %inner.state, "activation rejected: session busy");
      return Err(SessionError::ConcurrentEmergency { subject_id, incident_id });
    }

    let (tx, rx) = oneshot::channel();
    inner.attempt += 1;
    inner.state = SessionState::AcquiringLocation;
    inner.abort = Some(tx);

    let claim = Claim { shared: &self.shared, attempt: inner.attempt, armed: true };
    Ok((claim, rx))
  }

  /// Classify a failed create. If the subject now has an active incident,
  /// another controller sharing the store won the race for it.
  async fn create_failed(&self, subject_id: Uuid, err: S::Error) -> SessionError {
    if let Ok(Some(existing)) = self.store.find_active(subject_id).await {
      tracing::warn!(
        %subject_id,
        incident_id = %existing.incident_id,
        error = %err,
        "activation rejected: incident created concurrently"
      );
      return SessionError::ConcurrentEmergency {
        subject_id,
        incident_id: Some(existing.incident_id),
      };
    }
    tracing::error!(%subject_id, error = %err, "failed to record incident");
    SessionError::persistence(err)
  }

  /// Guard against a second active incident, then obtain the initial fix.
  async fn locate(&self, subject_id: Uuid) -> Result<LocationFix> {
    let existing = self
      .store
      .find_active(subject_id)
      .await
      .map_err(SessionError::persistence)?;
    if let Some(existing) = existing {
      tracing::warn!(
        %subject_id,
        incident_id = %existing.incident_id,
        "activation rejected: incident already active"
      );
      return Err(SessionError::ConcurrentEmergency {
        subject_id,
        incident_id: Some(existing.incident_id),
      });
    }

    let permission = self
      .location
      .request_permission()
      .await
      .map_err(SessionError::from_location)?;
    if !permission.is_granted() {
      tracing::warn!(?permission, "location permission not granted");
      return Err(SessionError::PermissionDenied);
    }

    let timeout = self.config.fix_timeout();
    match tokio::time::timeout(timeout, self.location.current_fix()).await {
      Ok(Ok(fix)) => {
        tracing::debug!(accuracy = fix.accuracy, "initial fix acquired");
        Ok(fix)
      }
      Ok(Err(e)) => {
        tracing::warn!(error = %e, "initial fix failed");
        Err(SessionError::from_location(e))
      }
      Err(_) => {
        tracing::warn!(?timeout, "initial fix timed out");
        Err(SessionError::PositionUnavailable(format!("no fix within {timeout:?}")))
      }
    }
  }

  async fn dispatch(
    &self,
    subject: &Subject,
    fix: &LocationFix,
    targets: &[Contact],
  ) -> NotificationOutcome {
    if targets.is_empty() {
      tracing::warn!(subject_id = %subject.subject_id, "no emergency contacts to notify");
      return NotificationOutcome::NoContacts;
    }

    let message = distress_message(&self.config.alert_prefix, &subject.name, fix, Utc::now());
    let timeout = self.config.notify_timeout();

    match tokio::time::timeout(timeout, self.notifier.notify(targets, &message)).await {
      Ok(Ok(report)) => {
        if report.is_complete() {
          tracing::info!(delivered = report.delivered.len(), "emergency contacts notified");
        } else {
          tracing::warn!(
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "distress message only partially delivered"
          );
        }
        NotificationOutcome::Sent(report)
      }
      Ok(Err(e)) => {
        tracing::warn!(error = %e, "notification channel unavailable; continuing");
        NotificationOutcome::ChannelUnavailable(e.to_string())
      }
      Err(_) => {
        tracing::warn!(?timeout, "notification dispatch timed out; continuing");
        NotificationOutcome::ChannelUnavailable(format!("no response within {timeout:?}"))
      }
    }
  }

  async fn confirm_local(&self, outcome: &NotificationOutcome) {
    let body = match outcome {
      NotificationOutcome::Sent(report) if !report.delivered.is_empty() => {
        "Your emergency contacts have been notified."
      }
      NotificationOutcome::NoContacts => {
        "No emergency contacts configured. Your location is being recorded."
      }
      _ => "Your contacts could not be reached. Your location is being recorded.",
    };

    let confirm = self.notifier.confirm_local(CONFIRM_TITLE, body);
    match tokio::time::timeout(self.config.notify_timeout(), confirm).await {
      Ok(Ok(())) => {}
      Ok(Err(e)) => tracing::debug!(error = %e, "local confirmation failed"),
      Err(_) => tracing::debug!("local confirmation timed out"),
    }
  }

  // ── Tracking ────────────────────────────────────────────────────────────

  async fn prepare_tracking(&self, incident: Incident) -> PendingTracking<L> {
    let (tx, updates) = mpsc::unbounded_channel();
    let on_update: FixCallback = Arc::new(move |fix| {
      // The receiver is gone once tracking has ended.
      let _ = tx.send(fix);
    });

    let watch = match self.location.watch(self.config.watch_options(), on_update).await {
      Ok(handle) => Some(WatchGuard::new(self.location.clone(), handle)),
      Err(e) => {
        tracing::warn!(
          incident_id = %incident.incident_id,
          error = %e,
          "location watch unavailable; tracking without live updates"
        );
        None
      }
    };
    let alarm = AlarmGuard::new(self.feedback.clone(), self.config.alarm_on_start);

    PendingTracking { incident, updates, watch, alarm }
  }

  /// Enter TRACKING with `pending`, unless the claim was superseded (e.g. by
  /// a teardown) in the meantime.
  fn commit(&self, mut claim: Claim<'_, L>, pending: PendingTracking<L>) -> Result<()> {
    let incident_id = pending.incident.incident_id;
    let rejected = {
      let mut inner = self.shared.lock();
      if claim.is_current(&inner) {
        let tracking = pending.start(Arc::downgrade(&self.shared), self.store.clone());
        inner.tracking = Some(tracking);
        inner.state = SessionState::Tracking;
        inner.updates_applied = 0;
        inner.updates_dropped = 0;
        inner.abort = None;
        claim.armed = false;
        None
      } else {
        Some(pending)
      }
    };

    match rejected {
      None => Ok(()),
      Some(pending) => {
        drop(pending);
        tracing::warn!(%incident_id, "session released before tracking started; incident left active");
        Err(SessionError::Aborted)
      }
    }
  }

  /// Flip the alarm while tracking. The setting is not stored on the
  /// incident. Returns the new value, or `None` when not tracking.
  pub fn toggle_alarm(&self) -> Option<bool> {
    let mut inner = self.shared.lock();
    if inner.state != SessionState::Tracking {
      return None;
    }
    inner.tracking.as_mut().map(|t| t.alarm.toggle())
  }

  // ── Exit paths ──────────────────────────────────────────────────────────

  /// User cancellation: stop tracking and resolve the incident.
  ///
  /// Returns the resolved incident, or `None` if there was nothing to cancel
  /// (including a second cancel while the first is still resolving).
  pub async fn cancel(&self) -> Result<Option<Incident>> {
    let tracking = {
      let _gate = self.shared.gate.lock().await;
      let mut inner = self.shared.lock();
      if inner.state != SessionState::Tracking {
        tracing::debug!(state = %inner.state, "cancel ignored");
        return Ok(None);
      }
      inner.state = SessionState::Resolving;
      inner.tracking.take()
    };
    let _reset = ResolvingReset(&self.shared);

    let Some(tracking) = tracking else {
      return Ok(None);
    };
    let incident_id = tracking.incident.incident_id;
    drop(tracking);
    tracing::info!(%incident_id, "emergency cancelled; resolving incident");

    match self.store.resolve(incident_id).await {
      Ok(incident) => Ok(Some(incident)),
      Err(e) => {
        tracing::error!(%incident_id, error = %e, "failed to resolve incident; left active");
        Err(SessionError::persistence(e))
      }
    }
  }

  /// Process shutdown: release the watch and alarm from any state without
  /// resolving. Returns the incident left active, if one was being tracked.
  pub fn teardown(&self) -> Option<Uuid> { self.shared.release("teardown") }

  /// Pick up an incident left active by a teardown, a restart or a failed
  /// resolve, and track it again. Returns `None` if the subject has no
  /// active incident.
  pub async fn resume(&self, subject: &Subject) -> Result<Option<Incident>> {
    let subject_id = subject.subject_id;
    let (claim, _abort) = self.claim(subject_id)?;

    let Some(incident) = self
      .store
      .find_active(subject_id)
      .await
      .map_err(SessionError::persistence)?
    else {
      return Ok(None);
    };

    claim.ensure_live(incident.incident_id)?;
    let pending = self.prepare_tracking(incident.clone()).await;
    self.commit(claim, pending)?;

    tracing::info!(incident_id = %incident.incident_id, %subject_id, "tracking resumed");
    Ok(Some(incident))
  }

  #[cfg(test)]
  pub(crate) fn shared(&self) -> &Shared<L> { &self.shared }
}

impl<L, N, S> Drop for EmergencySessionController<L, N, S>
where
  L: LocationProvider + 'static,
  N: NotificationDispatcher + 'static,
  S: IncidentStore + 'static,
{
  fn drop(&mut self) { self.shared.release("controller dropped"); }
}
