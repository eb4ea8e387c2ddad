use super::engine::SyncEngine;
use super::event::SyncStatus;
use super::key::ResourceKey;

/// The `{value, set_value, save}` surface for one resource key.
///
/// Holds no state of its own; every read goes back to the engine's store.
pub struct Binding<D> {
  key: ResourceKey,
  engine: SyncEngine<D>,
}

impl<D> Clone for Binding<D> {
  fn clone(&self) -> Self {
    Self {
      key: self.key.clone(),
      engine: self.engine.clone(),
    }
  }
}

impl<D: Clone + Send + Sync + 'static> Binding<D> {
  pub(crate) fn new(key: ResourceKey, engine: SyncEngine<D>) -> Self {
    Self { key, engine }
  }

  pub fn key(&self) -> &ResourceKey {
    &self.key
  }

  /// The draft if there is one, otherwise the cached server value.
  pub fn value(&self) -> Option<D> {
    self.engine.value(&self.key)
  }

  /// Record a local edit and schedule a debounced save.
  pub fn set_value(&self, value: D) {
    self.engine.set_draft(&self.key, Some(value));
  }

  /// Drop the local edit without saving it.
  pub fn discard(&self) {
    self.engine.set_draft(&self.key, None);
  }

  /// Save the current draft immediately.
  pub fn save(&self) {
    self.engine.flush(&self.key);
  }

  /// Force a refetch of the server value.
  pub fn refresh(&self) {
    self.engine.invalidate(&self.key);
  }

  pub fn status(&self) -> SyncStatus {
    self.engine.status(&self.key)
  }

  pub fn is_dirty(&self) -> bool {
    self.engine.draft(&self.key).is_some()
  }
}
