//! Periodic auto-load of the remote value.

use std::time::Duration;
use tokio::time::{self, Interval, MissedTickBehavior};

/// Ticks every `interval` while auto-load is enabled.
///
/// The poller only says when a refetch is due; whether a fetch is actually
/// issued is decided by the store (no draft, no fetch or save in flight).
#[derive(Debug)]
pub struct Poller {
  interval: Option<Interval>,
}

impl Poller {
  pub fn new(period: Duration, enabled: bool) -> Self {
    let interval = (enabled && !period.is_zero()).then(|| {
      // The first tick is the initial load, which the worker issues itself
      let mut interval = time::interval_at(time::Instant::now() + period, period);
      interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
      interval
    });
    Self { interval }
  }

  pub fn is_enabled(&self) -> bool {
    self.interval.is_some()
  }

  /// Wait for the next tick. Never resolves when auto-load is disabled.
  pub async fn tick(&mut self) {
    match self.interval.as_mut() {
      Some(interval) => {
        interval.tick().await;
      }
      None => std::future::pending::<()>().await,
    }
  }
}
