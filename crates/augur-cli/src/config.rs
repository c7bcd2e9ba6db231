//! Application configuration, deserialised from `config.toml` layered under
//! `AUGUR_*` environment variables (`__` separates nested keys, as in
//! `AUGUR_FORECAST__MAX_ATTEMPTS`).

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use augur_engine::config::{ForecastConfig, IngestConfig, ResolveConfig, ScoringConfig};
use augur_forecasters::ForecasterSettings;
use augur_sources::SourceSettings;
use serde::Deserialize;

fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/augur/augur.db") }

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  #[serde(default = "default_store_path")]
  pub store_path:  PathBuf,
  #[serde(default)]
  pub sources:     Vec<SourceSettings>,
  #[serde(default)]
  pub forecasters: Vec<ForecasterSettings>,
  #[serde(default)]
  pub ingest:      IngestConfig,
  #[serde(default)]
  pub forecast:    ForecastConfig,
  #[serde(default)]
  pub resolve:     ResolveConfig,
  #[serde(default)]
  pub scoring:     ScoringConfig,
}

impl AppConfig {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let cfg: Self = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("AUGUR")
          .prefix_separator("_")
          .separator("__"),
      )
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise AppConfig")?;
    cfg.validate()?;
    Ok(cfg)
  }

  /// Reject values that would overflow time arithmetic or stall a cycle.
  pub fn validate(&self) -> anyhow::Result<()> {
    self.ingest.validate().context("invalid [ingest] section")?;
    self.forecast.validate().context("invalid [forecast] section")?;
    self.resolve.validate().context("invalid [resolve] section")?;
    self.scoring.validate().context("invalid [scoring] section")?;
    Ok(())
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use augur_engine::config::{ClampPolicy, PollPolicy};
  use config::{File, FileFormat};

  use super::*;

  fn parse(toml: &str) -> AppConfig {
    config::Config::builder()
      .add_source(File::from_str(toml, FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn empty_config_uses_defaults() {
    let cfg = parse("");
    assert!(cfg.sources.is_empty());
    assert_eq!(cfg.forecast.refresh_after_hours, 24);
    assert_eq!(cfg.resolve.policy, PollPolicy::DueOnly);
    assert_eq!(cfg.scoring.windows_days, vec![30, 90, 365]);
  }

  #[test]
  fn full_config() {
    let cfg = parse(
      r#"
        store_path = "/tmp/augur.db"

        [[sources]]
        name = "manifold"
        max_pages = 2

        [[sources]]
        name = "gjo"
        kind = "good_judgment"

        [[forecasters]]
        id = "gpt-4o-mini"
        provider = "openai"

        [[forecasters]]
        id = "crowd"
        kind = "crowd"

        [forecast]
        clamp_policy = "clamp"
        max_attempts = 5

        [[forecast.providers]]
        name = "openai"
        max_concurrency = 4
        min_interval_ms = 250

        [resolve]
        policy = "all_open"
        correction_window_hours = 48
      "#,
    );
    assert_eq!(cfg.store_path, PathBuf::from("/tmp/augur.db"));
    assert_eq!(cfg.sources.len(), 2);
    assert_eq!(cfg.sources[0].max_pages, 2);
    assert_eq!(cfg.sources[1].kind.as_deref(), Some("good_judgment"));
    assert_eq!(cfg.forecasters[1].kind, "crowd");
    assert_eq!(cfg.forecast.clamp_policy, ClampPolicy::Clamp);
    assert_eq!(cfg.forecast.max_attempts, 5);
    assert_eq!(cfg.forecast.provider("openai").max_concurrency, 4);
    assert_eq!(cfg.resolve.policy, PollPolicy::AllOpen);
    assert_eq!(cfg.resolve.correction_window_hours, Some(48));
  }

  #[test]
  fn defaults_pass_validation() {
    assert!(parse("").validate().is_ok());
  }

  #[test]
  fn oversized_windows_fail_validation() {
    let cfg = parse("[forecast]\nrefresh_after_hours = 1000000000000\n");
    assert!(cfg.validate().is_err());

    let cfg = parse("[scoring]\nwindows_days = [30, 100000000]\n");
    assert!(cfg.validate().is_err());

    let cfg = parse("[resolve]\ncorrection_window_hours = 99999999999\n");
    assert!(cfg.validate().is_err());
  }

  #[test]
  fn tilde_expansion() {
    let plain = Path::new("/var/lib/augur.db");
    assert_eq!(expand_tilde(plain), plain);
    if let Ok(home) = std::env::var("HOME") {
      assert_eq!(expand_tilde(Path::new("~/a.db")), PathBuf::from(home).join("a.db"));
    }
  }
}
