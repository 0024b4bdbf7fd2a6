//! Haptic and audible feedback.
//!
//! Feedback is a side effect only; nothing in the workflow depends on it
//! succeeding. The alarm is a scoped resource: [`AlarmGuard`] switches it off
//! when dropped, whichever way tracking ends.

use std::{sync::Arc, time::Duration};

/// Strength of a single haptic pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpactStyle {
  Light,
  Medium,
  Heavy,
}

/// Vibration timing for Morse `... --- ...`, alternating wait / vibrate, in
/// milliseconds.
pub const SOS_PATTERN_MS: [u64; 18] = [
  0, 200, 100, 200, 100, 200, // S
  300, 600, 100, 600, 100, 600, // O
  300, 200, 100, 200, 100, 200, // S
];

pub fn sos_pattern() -> Vec<Duration> {
  SOS_PATTERN_MS.iter().copied().map(Duration::from_millis).collect()
}

/// Device feedback channels. Implementations must not block.
pub trait Feedback: Send + Sync {
  fn impact(&self, style: ImpactStyle);

  fn vibrate(&self, pattern: &[Duration]);

  /// Start or stop the continuous audible/vibration alarm.
  fn set_alarm(&self, on: bool);
}

/// Feedback sink for headless use.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFeedback;

impl Feedback for NoFeedback {
  fn impact(&self, _style: ImpactStyle) {}

  fn vibrate(&self, _pattern: &[Duration]) {}

  fn set_alarm(&self, _on: bool) {}
}

/// Owns the alarm for the lifetime of a tracking session.
pub struct AlarmGuard {
  feedback: Arc<dyn Feedback>,
  on:       bool,
}

impl AlarmGuard {
  pub fn new(feedback: Arc<dyn Feedback>, on: bool) -> Self {
    if on {
      feedback.set_alarm(true);
    }
    Self { feedback, on }
  }

  pub fn is_on(&self) -> bool { self.on }

  /// Flip the alarm and return the new value.
  pub fn toggle(&mut self) -> bool {
    self.on = !self.on;
    self.feedback.set_alarm(self.on);
    self.on
  }
}

impl Drop for AlarmGuard {
  fn drop(&mut self) {
    if self.on {
      self.feedback.set_alarm(false);
    }
  }
}

impl std::fmt::Debug for AlarmGuard {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AlarmGuard").field("on", &self.on).finish()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;

  #[derive(Default)]
  struct AlarmLog(Mutex<Vec<bool>>);

  impl Feedback for AlarmLog {
    fn impact(&self, _style: ImpactStyle) {}
    fn vibrate(&self, _pattern: &[Duration]) {}
    fn set_alarm(&self, on: bool) { self.0.lock().unwrap().push(on); }
  }

  #[test]
  fn guard_switches_alarm_off_on_drop() {
    let log = Arc::new(AlarmLog::default());
    let guard = AlarmGuard::new(log.clone(), true);
    assert!(guard.is_on());
    drop(guard);
    assert_eq!(*log.0.lock().unwrap(), [true, false]);
  }

  #[test]
  fn muted_guard_stays_silent_on_drop() {
    let log = Arc::new(AlarmLog::default());
    let mut guard = AlarmGuard::new(log.clone(), true);
    assert!(!guard.toggle());
    drop(guard);
    assert_eq!(*log.0.lock().unwrap(), [true, false]);
  }

  #[test]
  fn sos_pattern_spells_three_three_three() {
    let pulses: Vec<u64> = SOS_PATTERN_MS.iter().copied().skip(1).step_by(2).collect();
    assert_eq!(pulses, [200, 200, 200, 600, 600, 600, 200, 200, 200]);
    assert_eq!(sos_pattern().len(), 18);
  }
}
