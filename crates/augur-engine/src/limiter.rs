//! Request-start pacing shared by all workers of one provider.

use std::time::Duration;

use tokio::{
  sync::Mutex,
  time::{Instant, sleep_until},
};
use tracing::debug;

#[derive(Debug)]
pub struct RateLimiter {
  min_interval: Duration,
  next_slot:    Mutex<Instant>,
}

impl RateLimiter {
  pub fn new(min_interval: Duration) -> Self {
    Self { min_interval, next_slot: Mutex::new(Instant::now()) }
  }

  /// Wait for this caller's start slot. Slots are handed out in call order,
  /// `min_interval` apart.
  pub async fn acquire(&self) {
    if self.min_interval.is_zero() {
      return;
    }
    let slot = {
      let mut next = self.next_slot.lock().await;
      let slot = (*next).max(Instant::now());
      *next = slot + self.min_interval;
      slot
    };
    let wait = slot.saturating_duration_since(Instant::now());
    if !wait.is_zero() {
      debug!(wait_ms = wait.as_millis() as u64, "rate limiting");
      sleep_until(slot).await;
    }
  }
}
