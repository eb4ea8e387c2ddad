//! Optimistic save choreography: begin, then settle with rollback.

use tracing::debug;

use super::cache::RemoteCache;
use super::draft::DraftStore;
use super::key::ResourceKey;

/// A save that has started but not settled.
///
/// Holds the value being written and the cached value it replaced, so a
/// rejected write can be rolled back. Consumed by [`PendingMutation::settle`].
#[derive(Debug, Clone)]
pub struct PendingMutation<D> {
  key: ResourceKey,
  target: D,
  previous: Option<D>,
}

/// What a settled save did to local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
  /// The server accepted the write
  Saved,
  /// Cache reverted, failed value restored as the draft
  RolledBack,
  /// Cache reverted, a newer draft was kept in place of the failed value
  RolledBackKeptNewer,
}

impl<D: Clone> PendingMutation<D> {
  /// Start a save for `key` from the draft as it is right now.
  ///
  /// Returns `None` without touching anything when there is no draft.
  /// Otherwise cancels any in-flight fetch, snapshots the cached value,
  /// writes the draft into the cache optimistically and clears the draft.
  pub fn begin(
    key: &ResourceKey,
    drafts: &mut DraftStore<D>,
    cache: &mut RemoteCache<D>,
  ) -> Option<Self> {
    let target = drafts.get(key)?.clone();

    if cache.cancel_in_flight_fetch(key) {
      debug!(key = %key, "cancelled in-flight fetch before save");
    }
    let previous = cache.get(key).cloned();
    cache.set(key, Some(target.clone()));
    drafts.set(key, None);

    Some(Self {
      key: key.clone(),
      target,
      previous,
    })
  }

  pub fn key(&self) -> &ResourceKey {
    &self.key
  }

  pub fn target(&self) -> &D {
    &self.target
  }

  pub fn previous(&self) -> Option<&D> {
    self.previous.as_ref()
  }

  /// Apply the outcome of the remote write.
  ///
  /// A rejected write restores the snapshot into the cache and, unless the
  /// user has started a newer draft, puts the failed value back as the draft.
  /// Either way the entry is invalidated so the next eligible read refetches.
  pub fn settle(
    self,
    accepted: bool,
    drafts: &mut DraftStore<D>,
    cache: &mut RemoteCache<D>,
  ) -> Settled {
    let Self {
      key,
      target,
      previous,
    } = self;

    let settled = if accepted {
      Settled::Saved
    } else {
      cache.set(&key, previous);
      if drafts.contains(&key) {
        debug!(key = %key, "rollback keeps newer draft");
        Settled::RolledBackKeptNewer
      } else {
        debug!(key = %key, "rollback restores draft");
        drafts.set(&key, Some(target));
        Settled::RolledBack
      }
    };

    cache.invalidate(&key);
    settled
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn key() -> ResourceKey {
    ResourceKey::from(["user", "data"])
  }

  fn seeded(remote: &str) -> (DraftStore<String>, RemoteCache<String>) {
    let mut cache = RemoteCache::new();
    let ticket = cache.begin_fetch(&key()).unwrap();
    cache.complete_fetch(&key(), ticket, Some(remote.to_string()));
    (DraftStore::new(), cache)
  }

  #[test]
  fn test_begin_without_draft_is_noop() {
    let (mut drafts, mut cache) = seeded("Alice");
    let ticket = cache.begin_fetch(&key());

    assert!(PendingMutation::begin(&key(), &mut drafts, &mut cache).is_none());
    assert_eq!(cache.get(&key()).map(String::as_str), Some("Alice"));
    // The in-flight fetch is left alone
    assert_eq!(cache.entry(&key()).unwrap().in_flight, ticket);
  }

  #[test]
  fn test_begin_is_optimistic() {
    let (mut drafts, mut cache) = seeded("Alice");
    drafts.set(&key(), Some("Bob".to_string()));
    let ticket = cache.begin_fetch(&key()).unwrap();

    let pending = PendingMutation::begin(&key(), &mut drafts, &mut cache).unwrap();

    assert_eq!(pending.target(), "Bob");
    assert_eq!(pending.previous().map(String::as_str), Some("Alice"));
    assert_eq!(cache.get(&key()).map(String::as_str), Some("Bob"));
    assert!(!drafts.contains(&key()));
    assert!(!cache.is_fetching(&key()));

    // The fetch that was in flight can no longer land
    assert!(!cache.complete_fetch(&key(), ticket, Some("Alice".to_string())));
    assert_eq!(cache.get(&key()).map(String::as_str), Some("Bob"));
  }

  #[test]
  fn test_settle_success_invalidates() {
    let (mut drafts, mut cache) = seeded("Alice");
    drafts.set(&key(), Some("Bob".to_string()));
    let pending = PendingMutation::begin(&key(), &mut drafts, &mut cache).unwrap();

    assert_eq!(pending.settle(true, &mut drafts, &mut cache), Settled::Saved);
    assert_eq!(cache.get(&key()).map(String::as_str), Some("Bob"));
    assert!(!drafts.contains(&key()));
    assert!(cache.is_stale(&key()));
  }

  #[test]
  fn test_settle_failure_rolls_back_and_restores_draft() {
    let (mut drafts, mut cache) = seeded("Alice");
    drafts.set(&key(), Some("Bob".to_string()));
    let pending = PendingMutation::begin(&key(), &mut drafts, &mut cache).unwrap();

    assert_eq!(
      pending.settle(false, &mut drafts, &mut cache),
      Settled::RolledBack
    );
    assert_eq!(cache.get(&key()).map(String::as_str), Some("Alice"));
    assert_eq!(drafts.get(&key()).map(String::as_str), Some("Bob"));
    assert!(cache.is_stale(&key()));
  }

  #[test]
  fn test_settle_failure_keeps_newer_draft() {
    let (mut drafts, mut cache) = seeded("Alice");
    drafts.set(&key(), Some("Bob".to_string()));
    let pending = PendingMutation::begin(&key(), &mut drafts, &mut cache).unwrap();

    drafts.set(&key(), Some("Carol".to_string()));

    assert_eq!(
      pending.settle(false, &mut drafts, &mut cache),
      Settled::RolledBackKeptNewer
    );
    assert_eq!(cache.get(&key()).map(String::as_str), Some("Alice"));
    assert_eq!(drafts.get(&key()).map(String::as_str), Some("Carol"));
  }

  #[test]
  fn test_rollback_to_absent_value() {
    let mut drafts = DraftStore::new();
    let mut cache: RemoteCache<i32> = RemoteCache::new();
    drafts.set(&key(), Some(5));

    let pending = PendingMutation::begin(&key(), &mut drafts, &mut cache).unwrap();
    assert!(pending.previous().is_none());
    pending.settle(false, &mut drafts, &mut cache);

    assert!(cache.get(&key()).is_none());
    assert_eq!(drafts.get(&key()), Some(&5));
  }
}
