//! Concrete [`Forecaster`]s and a factory building them from configuration.

pub mod crowd;
pub mod error;
pub mod llm;

use std::sync::Arc;

use augur_core::forecaster::Forecaster;
use serde::Deserialize;

pub use self::{
  crowd::CrowdForecaster,
  error::{Error, Result},
  llm::LlmForecaster,
};

fn default_kind() -> String { "llm".to_owned() }

/// One `[[forecasters]]` entry in the application config.
#[derive(Debug, Clone, Deserialize)]
pub struct ForecasterSettings {
  /// Recorded on every forecast; must be unique.
  pub id:          String,
  /// `llm` or `crowd`.
  #[serde(default = "default_kind")]
  pub kind:        String,
  /// Provider pool name. Defaults to `openai` for `llm` forecasters.
  pub provider:    Option<String>,
  /// Model identifier sent to the provider. Defaults to `id`.
  pub model:       Option<String>,
  pub base_url:    Option<String>,
  pub api_key_env: Option<String>,
  #[serde(default)]
  pub temperature: f32,
}

impl ForecasterSettings {
  pub fn llm(id: impl Into<String>) -> Self {
    Self {
      id:          id.into(),
      kind:        default_kind(),
      provider:    None,
      model:       None,
      base_url:    None,
      api_key_env: None,
      temperature: 0.0,
    }
  }
}

/// Build the forecaster described by `settings`.
pub fn build(settings: &ForecasterSettings) -> Result<Arc<dyn Forecaster>> {
  match settings.kind.as_str() {
    "crowd" => Ok(Arc::new(CrowdForecaster::new(settings.id.clone()))),
    "llm" => {
      let api_key = settings
        .api_key_env
        .as_ref()
        .map(|var| std::env::var(var).map_err(|_| Error::MissingApiKey(var.clone())))
        .transpose()?;
      Ok(Arc::new(LlmForecaster::new(
        settings.id.clone(),
        settings.provider.as_deref().unwrap_or("openai"),
        settings.model.as_deref().unwrap_or(&settings.id),
        settings.base_url.as_deref(),
        api_key,
        settings.temperature,
      )?))
    }
    other => Err(Error::UnknownKind(other.to_owned())),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builds_llm_with_defaults() {
    let f = build(&ForecasterSettings::llm("gpt-4o-mini")).unwrap();
    assert_eq!(f.id(), "gpt-4o-mini");
    assert_eq!(f.provider(), "openai");
    assert_eq!(f.model(), "gpt-4o-mini");
  }

  #[test]
  fn builds_crowd_baseline() {
    let mut s = ForecasterSettings::llm("market");
    s.kind = "crowd".into();
    let f = build(&s).unwrap();
    assert_eq!(f.provider(), "crowd");
  }

  #[test]
  fn rejects_unknown_kind_and_missing_key() {
    let mut s = ForecasterSettings::llm("x");
    s.kind = "oracle".into();
    assert!(matches!(build(&s).err().unwrap(), Error::UnknownKind(_)));

    let mut s = ForecasterSettings::llm("x");
    s.api_key_env = Some("AUGUR_TEST_SURELY_UNSET_KEY".into());
    assert!(matches!(build(&s).err().unwrap(), Error::MissingApiKey(_)));
  }
}
