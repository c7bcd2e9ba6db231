//! The `augur` binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! store, wires up the configured sources and forecasters, and runs one
//! pipeline stage per invocation. Every command is safe to re-run.

mod config;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use augur_core::{score::ScoreFilter, store::ForecastStore};
use augur_engine::{
  ForecastScheduler, IngestionCoordinator, ResolutionTracker, SourceRegistry,
  export, scoring,
  stats::{self, LeaderboardRow},
};
use augur_store_sqlite::SqliteStore;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, expand_tilde};

#[derive(Parser)]
#[command(author, version, about = "Augur forecasting benchmark")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print cycle reports as JSON instead of a summary line.
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Fetch questions from every configured source.
  Ingest,
  /// Request forecasts for open questions that need one.
  Forecast,
  /// Poll sources for resolutions of open questions.
  Resolve,
  /// Recompute score records for resolved questions.
  Score,
  /// Ingest, forecast, resolve and score, in that order.
  Run,
  /// Show mean Brier scores, best first.
  Leaderboard {
    /// Break scores down by question category.
    #[arg(long)]
    by_category: bool,
    /// Only show this forecaster.
    #[arg(long)]
    forecaster:  Option<String>,
  },
  /// Write every table as JSON Lines into a directory.
  Export {
    dir: PathBuf,
  },
}

impl Command {
  /// Only stages that talk to sources need adapters, and their API keys.
  fn needs_sources(&self) -> bool {
    matches!(self, Command::Ingest | Command::Resolve | Command::Run)
  }
}

struct App {
  store:    Arc<SqliteStore>,
  registry: Option<Arc<SourceRegistry>>,
  config:   AppConfig,
  json:     bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let config = AppConfig::load(&cli.config)?;

  let store_path = expand_tilde(&config.store_path);
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let registry = if cli.command.needs_sources() {
    Some(Arc::new(build_registry(&config)?))
  } else {
    None
  };

  let app = App {
    store: Arc::new(store),
    registry,
    config,
    json: cli.json,
  };

  match cli.command {
    Command::Ingest => app.ingest().await,
    Command::Forecast => app.forecast().await,
    Command::Resolve => app.resolve().await,
    Command::Score => app.score().await,
    Command::Run => app.run().await,
    Command::Leaderboard { by_category, forecaster } => {
      app.leaderboard(by_category, forecaster).await
    }
    Command::Export { dir } => app.export(&dir).await,
  }
}

fn build_registry(config: &AppConfig) -> anyhow::Result<SourceRegistry> {
  let mut builder = SourceRegistry::builder();
  for settings in &config.sources {
    let adapter = augur_sources::build(settings)
      .with_context(|| format!("failed to build source {:?}", settings.name))?;
    builder = builder.register(adapter);
  }
  builder.build().context("invalid source configuration")
}

impl App {
  fn registry(&self) -> anyhow::Result<Arc<SourceRegistry>> {
    self
      .registry
      .clone()
      .context("source registry was not built for this command")
  }

  fn emit<T: Serialize>(&self, report: &T, summary: impl FnOnce() -> String) -> anyhow::Result<()> {
    if self.json {
      println!("{}", serde_json::to_string_pretty(report)?);
    } else {
      println!("{}", summary());
    }
    Ok(())
  }

  async fn ingest(&self) -> anyhow::Result<()> {
    let coordinator = IngestionCoordinator::new(
      self.store.clone(),
      self.registry()?,
      self.config.ingest.clone(),
    );
    let report = coordinator.run().await;
    self.emit(&report, || {
      let failed: Vec<&str> = report
        .sources
        .iter()
        .filter(|s| !s.succeeded())
        .map(|s| s.source.as_str())
        .collect();
      format!(
        "ingest: {} sources, {} created, {} updated, failed: [{}]",
        report.sources.len(),
        report.created(),
        report.updated(),
        failed.join(", "),
      )
    })?;
    if !report.succeeded() {
      anyhow::bail!("ingestion failed: no source completed successfully");
    }
    Ok(())
  }

  async fn forecast(&self) -> anyhow::Result<()> {
    let forecasters = self
      .config
      .forecasters
      .iter()
      .map(|s| {
        augur_forecasters::build(s).with_context(|| format!("failed to build forecaster {:?}", s.id))
      })
      .collect::<anyhow::Result<Vec<_>>>()?;
    let scheduler = ForecastScheduler::new(
      self.store.clone(),
      forecasters,
      self.config.forecast.clone(),
    )
    .context("invalid forecaster configuration")?;

    let report = scheduler.run().await.context("forecast cycle failed")?;
    self.emit(&report, || {
      format!(
        "forecast: {} open, {} jobs, {} succeeded, {} failed, {} rejected, {} skipped (circuit), {} skipped (deadline)",
        report.open_questions,
        report.jobs.len(),
        report.succeeded(),
        report.failed(),
        report.rejected(),
        report.skipped_open_circuit(),
        report.skipped_deadline(),
      )
    })
  }

  async fn resolve(&self) -> anyhow::Result<()> {
    let tracker = ResolutionTracker::new(
      self.store.clone(),
      self.registry()?,
      self.config.resolve.clone(),
    );
    let report = tracker.run().await.context("resolution cycle failed")?;
    self.emit(&report, || {
      format!(
        "resolve: {} polled, {} resolved, {} corrected, {} cancelled, {} invalid, {} still open, {} errors",
        report.polled,
        report.resolved,
        report.corrected,
        report.cancelled,
        report.invalidated,
        report.still_open,
        report.errors.len(),
      )
    })
  }

  async fn score(&self) -> anyhow::Result<()> {
    let report = scoring::score_all(self.store.as_ref())
      .await
      .context("scoring failed")?;
    self.emit(&report, || {
      format!(
        "score: {} questions, {} inserted, {} updated, {} unchanged, {} pruned",
        report.questions, report.inserted, report.updated, report.unchanged, report.pruned,
      )
    })
  }

  /// A failed ingestion does not stop the later stages; existing open
  /// questions still get forecast and resolved.
  async fn run(&self) -> anyhow::Result<()> {
    let ingested = self.ingest().await;
    if let Err(e) = &ingested {
      warn!(error = %e, "continuing without fresh questions");
    }
    self.forecast().await?;
    self.resolve().await?;
    self.score().await?;
    ingested
  }

  async fn leaderboard(&self, by_category: bool, forecaster: Option<String>) -> anyhow::Result<()> {
    let filter = ScoreFilter { forecaster_id: forecaster, ..Default::default() };
    let records = self
      .store
      .score_records(&filter)
      .await
      .context("failed to read score records")?;

    let overall = if by_category {
      stats::by_category(&records)
    } else {
      stats::leaderboard(&records)
    };
    let windows = stats::windowed(&records, chrono::Utc::now(), &self.config.scoring.windows_days);

    if self.json {
      let out = serde_json::json!({ "overall": overall, "windows": windows });
      println!("{}", serde_json::to_string_pretty(&out)?);
      return Ok(());
    }

    print_board("all time", &overall);
    for w in &windows {
      print_board(&format!("last {} days", w.days), &w.rows);
    }
    Ok(())
  }

  async fn export(&self, dir: &std::path::Path) -> anyhow::Result<()> {
    let summary = export::export_jsonl(self.store.as_ref(), dir)
      .await
      .with_context(|| format!("failed to export to {dir:?}"))?;
    info!(dir = %dir.display(), "export complete");
    self.emit(&summary, || {
      format!(
        "export: {} questions, {} snapshots, {} forecasts, {} failures, {} resolutions, {} scores",
        summary.questions,
        summary.snapshots,
        summary.forecasts,
        summary.failures,
        summary.resolutions,
        summary.scores,
      )
    })
  }
}

fn print_board(title: &str, rows: &[LeaderboardRow]) {
  println!("── {title} ──");
  if rows.is_empty() {
    println!("  (no scored questions)");
    return;
  }
  for (rank, row) in rows.iter().enumerate() {
    let category = row
      .category
      .as_deref()
      .map(|c| format!(" [{c}]"))
      .unwrap_or_default();
    println!(
      "{:>3}. {:<32} {:>8.4}  n={}",
      rank + 1,
      format!("{}{category}", row.forecaster_id),
      row.mean_brier,
      row.questions,
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_source_stages_build_adapters() {
    let needs = |args: &[&str]| {
      let cli = Cli::try_parse_from(std::iter::once("augur").chain(args.iter().copied())).unwrap();
      cli.command.needs_sources()
    };
    assert!(needs(&["ingest"]));
    assert!(needs(&["resolve"]));
    assert!(needs(&["run"]));
    assert!(!needs(&["forecast"]));
    assert!(!needs(&["score"]));
    assert!(!needs(&["leaderboard", "--by-category"]));
    assert!(!needs(&["export", "/tmp/out"]));
  }

  #[test]
  fn source_settings_are_not_read_for_leaderboard() {
    let mut config: AppConfig = ::config::Config::builder()
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap();
    let mut keyed = augur_sources::SourceSettings::named("good_judgment");
    keyed.api_key_env = Some("AUGUR_TEST_SURELY_UNSET_KEY".into());
    config.sources.push(keyed);

    assert!(build_registry(&config).is_err());
    let cli = Cli::try_parse_from(["augur", "leaderboard"]).unwrap();
    assert!(!cli.command.needs_sources());
  }
}
