//! Per-provider circuit breaker.
//!
//! Counts provider-level failures (timeouts, unavailability) in a sliding
//! window. Once `threshold` failures fall inside the window the breaker opens
//! and stays open for the rest of the cycle; a fresh breaker is built for
//! every cycle.

use std::{
  collections::VecDeque,
  sync::{Mutex, PoisonError},
  time::{Duration, Instant},
};

#[derive(Debug, Default)]
struct BreakerState {
  failures: VecDeque<Instant>,
  open:     bool,
}

#[derive(Debug)]
pub struct CircuitBreaker {
  threshold: u32,
  window:    Duration,
  state:     Mutex<BreakerState>,
}

impl CircuitBreaker {
  /// A `threshold` of zero disables the breaker.
  pub fn new(threshold: u32, window: Duration) -> Self {
    Self { threshold, window, state: Mutex::default() }
  }

  pub fn is_open(&self) -> bool {
    self.state.lock().unwrap_or_else(PoisonError::into_inner).open
  }

  /// Record a failure now. Returns `true` if this failure opened the breaker.
  pub fn record_failure(&self) -> bool { self.record_failure_at(Instant::now()) }

  pub fn record_failure_at(&self, now: Instant) -> bool {
    if self.threshold == 0 {
      return false;
    }
    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    if state.open {
      return false;
    }
    state.failures.push_back(now);
    while let Some(&oldest) = state.failures.front() {
      if now.saturating_duration_since(oldest) > self.window {
        state.failures.pop_front();
      } else {
        break;
      }
    }
    if state.failures.len() >= self.threshold as usize {
      state.open = true;
      return true;
    }
    false
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn opens_at_threshold_within_window() {
    let b = CircuitBreaker::new(3, Duration::from_secs(10));
    let t0 = Instant::now();
    assert!(!b.record_failure_at(t0));
    assert!(!b.record_failure_at(t0 + Duration::from_secs(1)));
    assert!(!b.is_open());
    assert!(b.record_failure_at(t0 + Duration::from_secs(2)));
    assert!(b.is_open());
    // Already open: further failures do not re-report the transition.
    assert!(!b.record_failure_at(t0 + Duration::from_secs(3)));
  }

  #[test]
  fn failures_outside_window_expire() {
    let b = CircuitBreaker::new(2, Duration::from_secs(5));
    let t0 = Instant::now();
    b.record_failure_at(t0);
    assert!(!b.record_failure_at(t0 + Duration::from_secs(6)));
    assert!(!b.is_open());
    assert!(b.record_failure_at(t0 + Duration::from_secs(7)));
  }

  #[test]
  fn zero_threshold_never_opens() {
    let b = CircuitBreaker::new(0, Duration::from_secs(5));
    for _ in 0..10 {
      b.record_failure();
    }
    assert!(!b.is_open());
  }
}
