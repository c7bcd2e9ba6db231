//! Exponential retry backoff with a ceiling.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Backoff {
  current: Duration,
  max:     Duration,
}

impl Backoff {
  pub fn new(initial: Duration, max: Duration) -> Self {
    Self { current: initial.min(max), max }
  }

  /// The delay before the next attempt. A provider's `retry_after` hint is
  /// honoured when it asks for longer than the schedule, up to the ceiling.
  pub fn next_delay(&mut self, hint: Option<Duration>) -> Duration {
    let delay = hint.map_or(self.current, |h| h.max(self.current)).min(self.max);
    self.current = self.current.saturating_mul(2).min(self.max);
    delay
  }
}
