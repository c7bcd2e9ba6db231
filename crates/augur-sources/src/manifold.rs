//! Manifold Markets adapter.
//!
//! Lists open binary markets from the public `GET /v0/markets` endpoint, paged
//! with the `before` cursor, and reads resolutions from `GET /v0/market/{id}`.

use std::time::Duration;

use async_trait::async_trait;
use augur_core::source::{RawQuestion, ResolutionStatus, SourceAdapter, SourceError};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::http;

pub const DEFAULT_BASE_URL: &str = "https://api.manifold.markets";

/// The subset of Manifold's market object the adapter reads.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Market {
  id:                     String,
  question:               String,
  url:                    Option<String>,
  outcome_type:           String,
  probability:            Option<f64>,
  /// Milliseconds since the epoch.
  created_time:           Option<i64>,
  close_time:             Option<i64>,
  #[serde(default)]
  is_resolved:            bool,
  resolution:             Option<String>,
  resolution_time:        Option<i64>,
  resolution_probability: Option<f64>,
  text_description:       Option<String>,
  #[serde(default)]
  group_slugs:            Vec<String>,
}

fn from_millis(ms: Option<i64>) -> Option<DateTime<Utc>> {
  ms.and_then(DateTime::from_timestamp_millis)
}

impl Market {
  fn is_binary(&self) -> bool { self.outcome_type == "BINARY" }

  fn into_raw(self) -> RawQuestion {
    RawQuestion {
      source_question_id: self.id,
      text:               self.question,
      background:         self.text_description,
      category:           self.group_slugs.into_iter().next(),
      url:                self.url,
      open_date:          from_millis(self.created_time),
      resolution_date:    from_millis(self.close_time).map(|dt| dt.date_naive()),
      base_rate:          self.probability,
    }
  }

  fn resolution_status(&self) -> Result<ResolutionStatus, SourceError> {
    if !self.is_resolved {
      return Ok(ResolutionStatus::StillOpen);
    }
    let resolved = |outcome: f64| ResolutionStatus::Resolved {
      outcome,
      resolved_at: from_millis(self.resolution_time),
      confirmed: true,
    };
    match self.resolution.as_deref() {
      Some("YES") => Ok(resolved(1.0)),
      Some("NO") => Ok(resolved(0.0)),
      Some("MKT") => self
        .resolution_probability
        .map(resolved)
        .ok_or_else(|| SourceError::permanent(format!("market {}: MKT without probability", self.id))),
      Some("CANCEL") => Ok(ResolutionStatus::Cancelled { reason: Some("cancelled on Manifold".into()) }),
      other => Err(SourceError::permanent(format!(
        "market {}: unrecognised resolution {other:?}",
        self.id
      ))),
    }
  }
}

/// Decode one page, skipping (and logging) records that do not parse.
fn parse_page(values: Vec<serde_json::Value>) -> (usize, Vec<Market>) {
  let total = values.len();
  let markets = values
    .into_iter()
    .filter_map(|v| match serde_json::from_value::<Market>(v) {
      Ok(m) => Some(m),
      Err(e) => {
        warn!(source = "manifold", error = %e, "skipping unparseable market");
        None
      }
    })
    .collect();
  (total, markets)
}

pub struct ManifoldSource {
  name:      String,
  client:    Client,
  base_url:  String,
  page_size: usize,
  max_pages: usize,
}

impl ManifoldSource {
  pub fn new(
    name: impl Into<String>,
    base_url: Option<String>,
    page_size: usize,
    max_pages: usize,
    timeout: Duration,
  ) -> reqwest::Result<Self> {
    Ok(Self {
      name:      name.into(),
      client:    http::client(timeout, None)?,
      base_url:  base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
      page_size: page_size.clamp(1, 1000),
      max_pages: max_pages.max(1),
    })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/v0{}", self.base_url.trim_end_matches('/'), path)
  }
}

#[async_trait]
impl SourceAdapter for ManifoldSource {
  fn name(&self) -> &str { &self.name }

  async fn fetch_questions(&self) -> Result<Vec<RawQuestion>, SourceError> {
    let mut out = Vec::new();
    let mut before: Option<String> = None;

    for page in 0..self.max_pages {
      let mut req = self
        .client
        .get(self.url("/markets"))
        .query(&[("limit", self.page_size.to_string())]);
      if let Some(cursor) = &before {
        req = req.query(&[("before", cursor)]);
      }
      let values: Vec<serde_json::Value> = http::get_json("GET /v0/markets", req)
        .await?
        .ok_or_else(|| SourceError::permanent("GET /v0/markets → 404"))?;

      let (total, markets) = parse_page(values);
      before = markets.last().map(|m| m.id.clone());
      out.extend(
        markets
          .into_iter()
          .filter(|m| m.is_binary() && !m.is_resolved)
          .map(Market::into_raw),
      );
      debug!(source = %self.name, page, total, kept = out.len(), "fetched markets page");
      if total < self.page_size || before.is_none() {
        break;
      }
    }
    Ok(out)
  }

  async fn fetch_resolution(
    &self,
    source_question_id: &str,
  ) -> Result<ResolutionStatus, SourceError> {
    let req = self.client.get(self.url(&format!("/market/{source_question_id}")));
    match http::get_json::<Market>("GET /v0/market", req).await? {
      Some(market) => market.resolution_status(),
      None => Ok(ResolutionStatus::NotFound),
    }
  }
}
