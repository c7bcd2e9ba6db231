//! Bulk export of the store as JSON Lines: one file per table, one row per
//! line. Read-only.

use std::path::Path;

use augur_core::{
  score::ScoreFilter,
  store::{ForecastFilter, ForecastStore},
};
use serde::Serialize;
use tracing::info;

use crate::{Error, Result};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportSummary {
  pub questions:   usize,
  pub snapshots:   usize,
  pub forecasts:   usize,
  pub failures:    usize,
  pub resolutions: usize,
  pub scores:      usize,
}

fn to_jsonl<T: Serialize>(rows: &[T]) -> Result<Vec<u8>> {
  let mut buf = Vec::new();
  for row in rows {
    serde_json::to_writer(&mut buf, row)?;
    buf.push(b'\n');
  }
  Ok(buf)
}

async fn write_table<T: Serialize>(dir: &Path, name: &str, rows: &[T]) -> Result<usize> {
  tokio::fs::write(dir.join(format!("{name}.jsonl")), to_jsonl(rows)?).await?;
  Ok(rows.len())
}

/// Write `questions`, `snapshots`, `forecasts`, `forecast_failures`,
/// `resolutions` and `scores` `.jsonl` files into `dir`, creating it if
/// needed. Existing files are overwritten.
pub async fn export_jsonl<S: ForecastStore>(store: &S, dir: &Path) -> Result<ExportSummary> {
  tokio::fs::create_dir_all(dir).await?;

  let views = store.list_questions(None).await.map_err(Error::store)?;
  let mut snapshots = Vec::new();
  let mut resolutions = Vec::new();
  for view in &views {
    let id = view.question.question_id;
    snapshots.extend(store.snapshots(id).await.map_err(Error::store)?);
    resolutions.extend(store.resolutions_for(id).await.map_err(Error::store)?);
  }
  let forecasts = store
    .list_forecasts(&ForecastFilter::default())
    .await
    .map_err(Error::store)?;
  let failures = store.forecast_failures(None).await.map_err(Error::store)?;
  let scores = store
    .score_records(&ScoreFilter::default())
    .await
    .map_err(Error::store)?;

  let summary = ExportSummary {
    questions:   write_table(dir, "questions", &views).await?,
    snapshots:   write_table(dir, "snapshots", &snapshots).await?,
    forecasts:   write_table(dir, "forecasts", &forecasts).await?,
    failures:    write_table(dir, "forecast_failures", &failures).await?,
    resolutions: write_table(dir, "resolutions", &resolutions).await?,
    scores:      write_table(dir, "scores", &scores).await?,
  };
  info!(dir = %dir.display(), ?summary, "export finished");
  Ok(summary)
}
