//! Keyed store of in-progress local edits.

use std::collections::HashMap;

use super::key::ResourceKey;

/// Holds at most one draft per resource key.
///
/// A missing entry means "no local edit": show whatever the server has.
/// That is a different state from a draft that happens to equal the remote
/// value, which is why drafts are kept as `Option<D>` and never compared
/// against the cache.
#[derive(Debug)]
pub struct DraftStore<D> {
  drafts: HashMap<ResourceKey, D>,
}

impl<D> Default for DraftStore<D> {
  fn default() -> Self {
    Self {
      drafts: HashMap::new(),
    }
  }
}

impl<D> DraftStore<D> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, key: &ResourceKey) -> Option<&D> {
    self.drafts.get(key)
  }

  pub fn contains(&self, key: &ResourceKey) -> bool {
    self.drafts.contains_key(key)
  }

  /// Replace the draft for `key`; `None` clears it. Returns the previous draft.
  pub fn set(&mut self, key: &ResourceKey, value: Option<D>) -> Option<D> {
    match value {
      Some(value) => self.drafts.insert(key.clone(), value),
      None => self.drafts.remove(key),
    }
  }

  /// Remove and return the current draft.
  pub fn take(&mut self, key: &ResourceKey) -> Option<D> {
    self.drafts.remove(key)
  }

  pub fn len(&self) -> usize {
    self.drafts.len()
  }

  pub fn is_empty(&self) -> bool {
    self.drafts.is_empty()
  }
}
