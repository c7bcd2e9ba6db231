//! The source registry: every active venue adapter, keyed by name.
//!
//! Built once at startup through [`SourceRegistryBuilder`] and read-only
//! afterwards.

use std::{collections::HashMap, sync::Arc};

use augur_core::source::SourceAdapter;

use crate::{Error, Result};

#[derive(Default)]
pub struct SourceRegistryBuilder {
  adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl SourceRegistryBuilder {
  pub fn new() -> Self { Self::default() }

  pub fn register(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
    self.adapters.push(adapter);
    self
  }

  /// Fails with [`Error::DuplicateSource`] if two adapters share a name.
  pub fn build(self) -> Result<SourceRegistry> {
    let mut index = HashMap::with_capacity(self.adapters.len());
    for (i, adapter) in self.adapters.iter().enumerate() {
      if index.insert(adapter.name().to_owned(), i).is_some() {
        return Err(Error::DuplicateSource(adapter.name().to_owned()));
      }
    }
    Ok(SourceRegistry { adapters: self.adapters, index })
  }
}

pub struct SourceRegistry {
  adapters: Vec<Arc<dyn SourceAdapter>>,
  index:    HashMap<String, usize>,
}

impl SourceRegistry {
  pub fn builder() -> SourceRegistryBuilder { SourceRegistryBuilder::new() }

  pub fn get(&self, name: &str) -> Option<&Arc<dyn SourceAdapter>> {
    self.index.get(name).map(|&i| &self.adapters[i])
  }

  /// Adapters in registration order.
  pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SourceAdapter>> {
    self.adapters.iter()
  }

  pub fn names(&self) -> Vec<&str> {
    self.adapters.iter().map(|a| a.name()).collect()
  }

  pub fn len(&self) -> usize { self.adapters.len() }

  pub fn is_empty(&self) -> bool { self.adapters.is_empty() }
}
