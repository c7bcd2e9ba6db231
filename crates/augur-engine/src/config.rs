//! Runtime parameters for each engine component, deserialised from the
//! `[ingest]`, `[forecast]`, `[resolve]` and `[scoring]` config sections.

use std::time::Duration;

use chrono::TimeDelta;
use serde::Deserialize;
use tokio::time::Instant;

use crate::{Error, Result};

/// A cycle with no configured deadline still stops eventually.
const NO_DEADLINE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Upper bound for every configured hour count: a century.
pub const MAX_HOURS: u64 = 100 * 365 * 24;
pub const MAX_SECS: u64 = MAX_HOURS * 60 * 60;
pub const MAX_MILLIS: u64 = MAX_SECS * 1000;
pub const MAX_WINDOW_DAYS: u32 = 100 * 365;

fn deadline(secs: Option<u64>) -> Duration {
  secs.map_or(NO_DEADLINE, Duration::from_secs)
}

/// The instant a cycle starting now must finish by.
pub fn deadline_from_now(timeout: Duration) -> Instant {
  let now = Instant::now();
  now
    .checked_add(timeout)
    .or_else(|| now.checked_add(NO_DEADLINE))
    .unwrap_or(now)
}

/// `hours` as a signed span, or `None` when it does not fit.
pub fn hours_delta(hours: u64) -> Option<TimeDelta> {
  i64::try_from(hours).ok().and_then(TimeDelta::try_hours)
}

fn at_most(field: &'static str, value: u64, max: u64) -> Result<()> {
  if value > max {
    return Err(Error::InvalidConfig { field, reason: format!("{value} exceeds the maximum of {max}") });
  }
  Ok(())
}

fn at_least_one(field: &'static str, value: u64) -> Result<()> {
  if value == 0 {
    return Err(Error::InvalidConfig { field, reason: "must be at least 1".into() });
  }
  Ok(())
}

// ─── Ingestion ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
  pub max_concurrent_sources: usize,
  pub cycle_timeout_secs:     Option<u64>,
}

impl Default for IngestConfig {
  fn default() -> Self {
    Self { max_concurrent_sources: 4, cycle_timeout_secs: None }
  }
}

impl IngestConfig {
  pub fn cycle_timeout(&self) -> Duration { deadline(self.cycle_timeout_secs) }

  pub fn validate(&self) -> Result<()> {
    at_least_one("ingest.max_concurrent_sources", self.max_concurrent_sources as u64)?;
    at_most("ingest.cycle_timeout_secs", self.cycle_timeout_secs.unwrap_or(0), MAX_SECS)
  }
}

// ─── Forecasting ─────────────────────────────────────────────────────────────

/// What to do with a provider probability outside [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClampPolicy {
  /// Treat it as `invalid_output`.
  #[default]
  Reject,
  /// Clamp into range and flag the forecast.
  Clamp,
}

/// Per-provider concurrency and pacing.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
  pub name:            String,
  #[serde(default = "default_max_concurrency")]
  pub max_concurrency: usize,
  /// Minimum spacing between request starts across all of the provider's
  /// workers.
  #[serde(default)]
  pub min_interval_ms: u64,
}

fn default_max_concurrency() -> usize { 2 }

impl ProviderConfig {
  pub fn named(name: impl Into<String>) -> Self {
    Self {
      name:            name.into(),
      max_concurrency: default_max_concurrency(),
      min_interval_ms: 0,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
  /// A pair with a forecast newer than this is not re-forecast.
  pub refresh_after_hours:  u64,
  pub request_timeout_secs: u64,
  pub max_attempts:         u32,
  pub initial_backoff_ms:   u64,
  pub max_backoff_ms:       u64,
  pub clamp_policy:         ClampPolicy,
  pub breaker_threshold:    u32,
  pub breaker_window_secs:  u64,
  /// Skip open questions whose expected resolution date is already behind
  /// us. Off by default: every open question is forecast.
  pub skip_past_due:        bool,
  pub cycle_timeout_secs:   Option<u64>,
  pub providers:            Vec<ProviderConfig>,
}

impl Default for ForecastConfig {
  fn default() -> Self {
    Self {
      refresh_after_hours:  24,
      request_timeout_secs: 60,
      max_attempts:         3,
      initial_backoff_ms:   500,
      max_backoff_ms:       30_000,
      clamp_policy:         ClampPolicy::Reject,
      breaker_threshold:    5,
      breaker_window_secs:  60,
      skip_past_due:        false,
      cycle_timeout_secs:   None,
      providers:            Vec::new(),
    }
  }
}

impl ForecastConfig {
  /// `None` when the window is too large to represent; nothing is ever
  /// stale then.
  pub fn refresh_after(&self) -> Option<TimeDelta> { hours_delta(self.refresh_after_hours) }

  pub fn request_timeout(&self) -> Duration { Duration::from_secs(self.request_timeout_secs) }

  pub fn initial_backoff(&self) -> Duration { Duration::from_millis(self.initial_backoff_ms) }

  pub fn max_backoff(&self) -> Duration { Duration::from_millis(self.max_backoff_ms) }

  pub fn breaker_window(&self) -> Duration { Duration::from_secs(self.breaker_window_secs) }

  pub fn cycle_timeout(&self) -> Duration { deadline(self.cycle_timeout_secs) }

  pub fn validate(&self) -> Result<()> {
    at_most("forecast.refresh_after_hours", self.refresh_after_hours, MAX_HOURS)?;
    at_least_one("forecast.request_timeout_secs", self.request_timeout_secs)?;
    at_most("forecast.request_timeout_secs", self.request_timeout_secs, MAX_SECS)?;
    at_least_one("forecast.max_attempts", u64::from(self.max_attempts))?;
    at_most("forecast.max_backoff_ms", self.max_backoff_ms, MAX_MILLIS)?;
    at_most("forecast.initial_backoff_ms", self.initial_backoff_ms, self.max_backoff_ms)?;
    at_most("forecast.breaker_window_secs", self.breaker_window_secs, MAX_SECS)?;
    at_most("forecast.cycle_timeout_secs", self.cycle_timeout_secs.unwrap_or(0), MAX_SECS)?;
    for p in &self.providers {
      at_least_one("forecast.providers.max_concurrency", p.max_concurrency as u64)?;
      at_most("forecast.providers.min_interval_ms", p.min_interval_ms, MAX_MILLIS)?;
    }
    Ok(())
  }

  /// The named provider's settings, or defaults when it is not listed.
  pub fn provider(&self, name: &str) -> ProviderConfig {
    self
      .providers
      .iter()
      .find(|p| p.name == name)
      .cloned()
      .unwrap_or_else(|| ProviderConfig::named(name))
  }
}

// ─── Resolution ──────────────────────────────────────────────────────────────

/// Which open questions the tracker polls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollPolicy {
  /// Only questions whose expected resolution date has arrived, or is
  /// unknown.
  #[default]
  DueOnly,
  AllOpen,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
  pub policy:                  PollPolicy,
  pub max_concurrent_polls:    usize,
  /// Re-poll questions resolved within this many hours to pick up venue
  /// corrections.
  pub correction_window_hours: Option<u64>,
  pub cycle_timeout_secs:      Option<u64>,
}

impl Default for ResolveConfig {
  fn default() -> Self {
    Self {
      policy:                  PollPolicy::DueOnly,
      max_concurrent_polls:    8,
      correction_window_hours: None,
      cycle_timeout_secs:      Some(15 * 60),
    }
  }
}

impl ResolveConfig {
  pub fn cycle_timeout(&self) -> Duration { deadline(self.cycle_timeout_secs) }

  pub fn validate(&self) -> Result<()> {
    at_least_one("resolve.max_concurrent_polls", self.max_concurrent_polls as u64)?;
    at_most("resolve.correction_window_hours", self.correction_window_hours.unwrap_or(0), MAX_HOURS)?;
    at_most("resolve.cycle_timeout_secs", self.cycle_timeout_secs.unwrap_or(0), MAX_SECS)
  }
}

// ─── Scoring ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
  /// Trailing windows, in days, for the windowed leaderboards.
  pub windows_days: Vec<u32>,
}

impl Default for ScoringConfig {
  fn default() -> Self { Self { windows_days: vec![30, 90, 365] } }
}

impl ScoringConfig {
  pub fn validate(&self) -> Result<()> {
    for &days in &self.windows_days {
      at_least_one("scoring.windows_days", u64::from(days))?;
      at_most("scoring.windows_days", u64::from(days), u64::from(MAX_WINDOW_DAYS))?;
    }
    Ok(())
  }
}
