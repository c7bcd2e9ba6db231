//! Baseline forecaster that echoes the venue's crowd probability. Scores for
//! it show how much the automated forecasters add over the market.

use async_trait::async_trait;
use augur_core::forecaster::{ForecastError, ForecastRequest, Forecaster, Generation};

/// Probability used when the venue publishes no crowd estimate.
pub const UNINFORMED: f64 = 0.5;

pub struct CrowdForecaster {
  id: String,
}

impl CrowdForecaster {
  pub fn new(id: impl Into<String>) -> Self { Self { id: id.into() } }
}

#[async_trait]
impl Forecaster for CrowdForecaster {
  fn id(&self) -> &str { &self.id }

  fn provider(&self) -> &str { "crowd" }

  fn model(&self) -> &str { "crowd" }

  async fn generate(
    &self,
    request: &ForecastRequest,
  ) -> Result<Generation, ForecastError> {
    let (probability, reasoning) = match request.base_rate {
      Some(p) => (p, "venue crowd probability"),
      None => (UNINFORMED, "no crowd probability published"),
    };
    Ok(Generation {
      probability,
      raw_output: probability.to_string(),
      reasoning: Some(reasoning.to_owned()),
    })
  }
}
