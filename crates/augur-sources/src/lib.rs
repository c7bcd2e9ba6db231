//! Concrete [`SourceAdapter`]s for public prediction venues, and a factory
//! building them from configuration.

pub mod error;
pub mod good_judgment;
mod http;
pub mod manifold;

use std::{sync::Arc, time::Duration};

use augur_core::source::SourceAdapter;
use serde::Deserialize;

pub use self::{
  error::{Error, Result},
  good_judgment::GoodJudgmentSource,
  manifold::ManifoldSource,
};

fn default_page_size() -> usize { 100 }
fn default_max_pages() -> usize { 5 }
fn default_timeout_secs() -> u64 { 30 }

/// One `[[sources]]` entry in the application config.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSettings {
  /// Registry name. Also selects the adapter when `kind` is omitted.
  pub name:         String,
  pub kind:         Option<String>,
  pub base_url:     Option<String>,
  #[serde(default = "default_page_size")]
  pub page_size:    usize,
  #[serde(default = "default_max_pages")]
  pub max_pages:    usize,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  /// Name of the environment variable holding an API token, if the venue
  /// needs one.
  pub api_key_env:  Option<String>,
}

impl SourceSettings {
  pub fn named(name: impl Into<String>) -> Self {
    Self {
      name:         name.into(),
      kind:         None,
      base_url:     None,
      page_size:    default_page_size(),
      max_pages:    default_max_pages(),
      timeout_secs: default_timeout_secs(),
      api_key_env:  None,
    }
  }

  fn kind(&self) -> &str { self.kind.as_deref().unwrap_or(&self.name) }

  fn api_key(&self) -> Result<Option<String>> {
    match &self.api_key_env {
      Some(var) => std::env::var(var)
        .map(Some)
        .map_err(|_| Error::MissingApiKey(var.clone())),
      None => Ok(None),
    }
  }
}

/// Build the adapter described by `settings`.
pub fn build(settings: &SourceSettings) -> Result<Arc<dyn SourceAdapter>> {
  let timeout = Duration::from_secs(settings.timeout_secs);
  let adapter: Arc<dyn SourceAdapter> = match settings.kind() {
    "manifold" => Arc::new(ManifoldSource::new(
      settings.name.clone(),
      settings.base_url.clone(),
      settings.page_size,
      settings.max_pages,
      timeout,
    )?),
    "good_judgment" | "gjopen" => Arc::new(GoodJudgmentSource::new(
      settings.name.clone(),
      settings.base_url.clone(),
      settings.api_key()?.as_deref(),
      settings.page_size,
      settings.max_pages,
      timeout,
    )?),
    other => return Err(Error::UnknownKind(other.to_owned())),
  };
  Ok(adapter)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kind_defaults_to_name() {
    let adapter = build(&SourceSettings::named("manifold")).unwrap();
    assert_eq!(adapter.name(), "manifold");

    let mut gj = SourceSettings::named("gj-open");
    gj.kind = Some("good_judgment".into());
    assert_eq!(build(&gj).unwrap().name(), "gj-open");
  }

  #[test]
  fn unknown_kind_is_rejected() {
    let err = build(&SourceSettings::named("polymarket")).err().unwrap();
    assert!(matches!(err, Error::UnknownKind(k) if k == "polymarket"));
  }

  #[test]
  fn missing_api_key_is_reported() {
    let mut s = SourceSettings::named("good_judgment");
    s.api_key_env = Some("AUGUR_TEST_SURELY_UNSET_KEY".into());
    assert!(matches!(build(&s).err().unwrap(), Error::MissingApiKey(_)));
  }
}
