//! Press-and-hold activation.
//!
//! The trigger fires once the input has been held for the full dwell time.
//! Releasing earlier is a silent cancel. After firing it stays disarmed until
//! [`ActivationTrigger::reset`] is called, so one hold can never produce two
//! activations.

use std::{future::Future, time::{Duration, Instant}};

use crate::feedback::{Feedback, ImpactStyle, sos_pattern};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
  /// One more whole second of the dwell has elapsed.
  Tick { remaining_secs: u64 },
  /// The dwell completed.
  Activated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
  Idle,
  Holding { since: Instant, ticks: u64 },
  Fired,
}

#[derive(Debug, Clone)]
pub struct ActivationTrigger {
  dwell: Duration,
  phase: Phase,
}

impl ActivationTrigger {
  pub fn new(dwell: Duration) -> Self { Self { dwell, phase: Phase::Idle } }

  pub fn dwell(&self) -> Duration { self.dwell }

  pub fn is_holding(&self) -> bool { matches!(self.phase, Phase::Holding { .. }) }

  /// `false` once fired and until [`Self::reset`].
  pub fn is_armed(&self) -> bool { !matches!(self.phase, Phase::Fired) }

  /// Begin a hold. Returns `false` (and does nothing) if already holding or
  /// not re-armed since the last activation.
  pub fn press(&mut self, now: Instant) -> bool {
    if self.phase != Phase::Idle {
      return false;
    }
    self.phase = Phase::Holding { since: now, ticks: 0 };
    true
  }

  /// Bring the hold up to `now`, emitting any ticks and the activation that
  /// became due.
  pub fn advance(&mut self, now: Instant) -> Vec<TriggerEvent> {
    let Phase::Holding { since, ticks } = self.phase else {
      return Vec::new();
    };

    let elapsed = now.saturating_duration_since(since);
    let dwell_secs = self.dwell.as_secs();
    let reached = elapsed.as_secs().min(dwell_secs);

    let mut events: Vec<TriggerEvent> = (ticks + 1..=reached)
      .map(|tick| TriggerEvent::Tick { remaining_secs: dwell_secs - tick })
      .collect();

    if elapsed >= self.dwell {
      self.phase = Phase::Fired;
      events.push(TriggerEvent::Activated);
    } else {
      self.phase = Phase::Holding { since, ticks: reached.max(ticks) };
    }
    events
  }

  /// End the hold at `now`. A hold that has reached the dwell by `now` still
  /// fires; otherwise elapsed time returns to zero.
  pub fn release(&mut self, now: Instant) -> Vec<TriggerEvent> {
    let events = self.advance(now);
    if self.is_holding() {
      self.phase = Phase::Idle;
    }
    events
  }

  /// Re-arm after an activation (or abandon a hold).
  pub fn reset(&mut self) { self.phase = Phase::Idle; }

  pub fn elapsed(&self, now: Instant) -> Duration {
    match self.phase {
      Phase::Holding { since, .. } => now.saturating_duration_since(since).min(self.dwell),
      Phase::Fired => self.dwell,
      Phase::Idle => Duration::ZERO,
    }
  }

  pub fn remaining(&self, now: Instant) -> Duration {
    self.dwell.saturating_sub(self.elapsed(now))
  }

  /// Next moment at which [`Self::advance`] will have something to report.
  fn next_deadline(&self) -> Option<Instant> {
    let Phase::Holding { since, ticks } = self.phase else {
      return None;
    };
    let next_tick = since + Duration::from_secs(ticks + 1);
    Some(next_tick.min(since + self.dwell))
  }

  /// Drive a hold on the tokio clock until `release` completes or the dwell
  /// elapses, playing feedback along the way. Returns `true` if the trigger
  /// fired.
  pub async fn hold<R>(&mut self, release: R, feedback: &dyn Feedback) -> bool
  where
    R: Future<Output = ()>,
  {
    if !self.press(tokio::time::Instant::now().into_std()) {
      return false;
    }
    feedback.impact(ImpactStyle::Heavy);
    tokio::pin!(release);

    loop {
      let Some(deadline) = self.next_deadline() else {
        return false;
      };

      tokio::select! {
        biased;
        () = &mut release => {
          let events = self.release(tokio::time::Instant::now().into_std());
          return play(&events, feedback);
        }
        () = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {
          let events = self.advance(tokio::time::Instant::now().into_std());
          if play(&events, feedback) {
            return true;
          }
        }
      }
    }
  }
}

/// Play feedback for `events`; `true` if they include the activation.
fn play(events: &[TriggerEvent], feedback: &dyn Feedback) -> bool {
  let mut fired = false;
  for event in events {
    match event {
      TriggerEvent::Tick { .. } => feedback.impact(ImpactStyle::Medium),
      TriggerEvent::Activated => {
        feedback.vibrate(&sos_pattern());
        fired = true;
      }
    }
  }
  if fired {
    tracing::info!("activation trigger fired");
  }
  fired
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;

  const DWELL: Duration = Duration::from_secs(3);

  fn ms(n: u64) -> Duration { Duration::from_millis(n) }

  fn activations(events: &[TriggerEvent]) -> usize {
    events.iter().filter(|e| **e == TriggerEvent::Activated).count()
  }

  #[test]
  fn release_before_dwell_emits_nothing() {
    let t0 = Instant::now();
    let mut trigger = ActivationTrigger::new(DWELL);
    assert!(trigger.press(t0));

    let mut events = trigger.advance(t0 + ms(1_500));
    events.extend(trigger.release(t0 + ms(2_900)));

    assert_eq!(activations(&events), 0);
    assert_eq!(
      events,
      [
        TriggerEvent::Tick { remaining_secs: 2 },
        TriggerEvent::Tick { remaining_secs: 1 },
      ]
    );
    assert_eq!(trigger.elapsed(t0 + ms(3_000)), Duration::ZERO);
    assert!(trigger.is_armed());
  }

  #[test]
  fn holding_for_the_dwell_fires_exactly_once() {
    let t0 = Instant::now();
    let mut trigger = ActivationTrigger::new(DWELL);
    trigger.press(t0);

    let mut events = trigger.advance(t0 + ms(3_000));
    events.extend(trigger.advance(t0 + ms(4_000)));
    events.extend(trigger.release(t0 + ms(6_000)));

    assert_eq!(activations(&events), 1);
    assert_eq!(events.len(), 4);
    assert!(!trigger.is_armed());
  }

  #[test]
  fn release_at_threshold_still_fires() {
    let t0 = Instant::now();
    let mut trigger = ActivationTrigger::new(DWELL);
    trigger.press(t0);
    assert_eq!(activations(&trigger.release(t0 + ms(3_000))), 1);
  }

  #[test]
  fn does_not_rearm_until_reset() {
    let t0 = Instant::now();
    let mut trigger = ActivationTrigger::new(DWELL);
    trigger.press(t0);
    trigger.advance(t0 + ms(3_100));

    assert!(!trigger.press(t0 + ms(4_000)));
    assert!(trigger.advance(t0 + ms(9_000)).is_empty());

    trigger.reset();
    assert!(trigger.press(t0 + ms(10_000)));
    assert_eq!(activations(&trigger.advance(t0 + ms(13_000))), 1);
  }

  #[test]
  fn new_hold_starts_from_zero() {
    let t0 = Instant::now();
    let mut trigger = ActivationTrigger::new(DWELL);
    trigger.press(t0);
    trigger.release(t0 + ms(2_500));

    trigger.press(t0 + ms(5_000));
    assert_eq!(trigger.remaining(t0 + ms(5_000)), DWELL);
    assert_eq!(activations(&trigger.advance(t0 + ms(7_900))), 0);
    assert_eq!(activations(&trigger.advance(t0 + ms(8_000))), 1);
  }

  // ─── Async driver ──────────────────────────────────────────────────────────

  #[derive(Default)]
  struct Haptics {
    impacts:    Mutex<Vec<ImpactStyle>>,
    vibrations: Mutex<usize>,
  }

  impl Feedback for Haptics {
    fn impact(&self, style: ImpactStyle) { self.impacts.lock().unwrap().push(style); }
    fn vibrate(&self, _pattern: &[Duration]) { *self.vibrations.lock().unwrap() += 1; }
    fn set_alarm(&self, _on: bool) {}
  }

  #[tokio::test(start_paused = true)]
  async fn hold_released_at_2_9s_does_not_fire() {
    let haptics = Haptics::default();
    let mut trigger = ActivationTrigger::new(DWELL);

    let fired = trigger.hold(tokio::time::sleep(ms(2_900)), &haptics).await;

    assert!(!fired);
    assert_eq!(
      *haptics.impacts.lock().unwrap(),
      [ImpactStyle::Heavy, ImpactStyle::Medium, ImpactStyle::Medium]
    );
    assert_eq!(*haptics.vibrations.lock().unwrap(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn hold_fires_at_dwell_without_waiting_for_release() {
    let haptics = Haptics::default();
    let mut trigger = ActivationTrigger::new(DWELL);
    let start = tokio::time::Instant::now();

    let fired = trigger.hold(std::future::pending(), &haptics).await;

    assert!(fired);
    assert_eq!(start.elapsed(), DWELL);
    assert_eq!(*haptics.vibrations.lock().unwrap(), 1);
    assert_eq!(haptics.impacts.lock().unwrap().len(), 4);

    // A second hold without reset is refused.
    assert!(!trigger.hold(std::future::pending(), &haptics).await);
  }
}
