//! Debounce with a maximum wait.
//!
//! A burst of edits produces one save: either `delay` after the last edit,
//! or `max_wait` after the first edit of the burst, whichever comes first.
//! Only the leading edit starts the ceiling clock.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
  Idle,
  Pending {
    first_edit: Instant,
    last_edit: Instant,
  },
}

/// Per-key save scheduler.
#[derive(Debug, Clone)]
pub struct Debouncer {
  delay: Duration,
  max_wait: Duration,
  state: DebounceState,
}

impl Debouncer {
  /// `max_wait` is raised to `delay` if it is shorter.
  pub fn new(delay: Duration, max_wait: Duration) -> Self {
    Self {
      delay,
      max_wait: max_wait.max(delay),
      state: DebounceState::Idle,
    }
  }

  pub fn state(&self) -> DebounceState {
    self.state
  }

  pub fn is_pending(&self) -> bool {
    matches!(self.state, DebounceState::Pending { .. })
  }

  /// Record an edit at `now`.
  pub fn notify(&mut self, now: Instant) {
    self.state = match self.state {
      DebounceState::Idle => DebounceState::Pending {
        first_edit: now,
        last_edit: now,
      },
      DebounceState::Pending { first_edit, .. } => DebounceState::Pending {
        first_edit,
        last_edit: now,
      },
    };
  }

  /// When the pending save should fire, if any.
  pub fn deadline(&self) -> Option<Instant> {
    match self.state {
      DebounceState::Idle => None,
      DebounceState::Pending {
        first_edit,
        last_edit,
      } => Some((last_edit + self.delay).min(first_edit + self.max_wait)),
    }
  }

  pub fn is_due(&self, now: Instant) -> bool {
    self.deadline().is_some_and(|deadline| now >= deadline)
  }

  /// Consume the pending save if it is due. Returns whether it fired.
  pub fn fire(&mut self, now: Instant) -> bool {
    if self.is_due(now) {
      self.state = DebounceState::Idle;
      true
    } else {
      false
    }
  }

  /// Drop any pending save, e.g. because it is being flushed right away.
  pub fn cancel(&mut self) {
    self.state = DebounceState::Idle;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
  }

  #[test]
  fn test_idle_has_no_deadline() {
    let debouncer = Debouncer::new(ms(500), ms(1000));
    assert_eq!(debouncer.deadline(), None);
    assert!(!debouncer.is_due(Instant::now()));
  }

  #[test]
  fn test_trailing_edge_after_last_edit() {
    let t = Instant::now();
    let mut debouncer = Debouncer::new(ms(500), ms(1000));

    debouncer.notify(t);
    debouncer.notify(t + ms(100));
    debouncer.notify(t + ms(150));

    assert_eq!(debouncer.deadline(), Some(t + ms(650)));
    assert!(!debouncer.fire(t + ms(649)));
    assert!(debouncer.fire(t + ms(650)));
    assert!(!debouncer.is_pending());
    // Fires exactly once
    assert!(!debouncer.fire(t + ms(700)));
  }

  #[test]
  fn test_ceiling_does_not_reset_within_burst() {
    let t = Instant::now();
    let mut debouncer = Debouncer::new(ms(500), ms(1000));

    let mut at = t;
    while at < t + ms(1000) {
      debouncer.notify(at);
      at += ms(100);
    }

    assert_eq!(debouncer.deadline(), Some(t + ms(1000)));
    assert!(debouncer.fire(t + ms(1000)));
  }

  #[test]
  fn test_new_burst_restarts_ceiling() {
    let t = Instant::now();
    let mut debouncer = Debouncer::new(ms(500), ms(1000));

    debouncer.notify(t);
    assert!(debouncer.fire(t + ms(500)));

    debouncer.notify(t + ms(800));
    assert_eq!(
      debouncer.state(),
      DebounceState::Pending {
        first_edit: t + ms(800),
        last_edit: t + ms(800),
      }
    );
    assert_eq!(debouncer.deadline(), Some(t + ms(1300)));
  }

  #[test]
  fn test_max_wait_shorter_than_delay_is_clamped() {
    let t = Instant::now();
    let mut debouncer = Debouncer::new(ms(500), ms(100));
    debouncer.notify(t);
    assert_eq!(debouncer.deadline(), Some(t + ms(500)));
  }

  #[test]
  fn test_cancel() {
    let t = Instant::now();
    let mut debouncer = Debouncer::new(ms(500), ms(1000));
    debouncer.notify(t);
    debouncer.cancel();
    assert_eq!(debouncer.deadline(), None);
  }
}
