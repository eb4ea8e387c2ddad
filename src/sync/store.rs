//! Process-wide draft and cache state behind one shared handle.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::cache::{CacheEntry, FetchTicket, RemoteCache};
use super::draft::DraftStore;
use super::key::ResourceKey;
use super::mutation::{PendingMutation, Settled};

/// Why a fetch result was not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDiscard {
  /// A draft appeared while the fetch was in flight
  DraftPresent,
  /// The fetch was cancelled or superseded
  Superseded,
}

#[derive(Debug)]
struct StoreState<D> {
  drafts: DraftStore<D>,
  cache: RemoteCache<D>,
  saving: HashSet<ResourceKey>,
}

/// Shared handle to drafts and cached remote values, keyed by [`ResourceKey`].
///
/// Cloning the handle shares the state. Every operation takes the lock for a
/// single synchronous step and never across an await, so callers always see
/// a consistent pairing of draft and cache.
#[derive(Debug)]
pub struct SyncStore<D> {
  state: Arc<Mutex<StoreState<D>>>,
}

impl<D> Clone for SyncStore<D> {
  fn clone(&self) -> Self {
    Self {
      state: Arc::clone(&self.state),
    }
  }
}

impl<D> Default for SyncStore<D> {
  fn default() -> Self {
    Self {
      state: Arc::new(Mutex::new(StoreState {
        drafts: DraftStore::new(),
        cache: RemoteCache::new(),
        saving: HashSet::new(),
      })),
    }
  }
}

impl<D: Clone> SyncStore<D> {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, StoreState<D>> {
    // State is only touched in short synchronous sections; a panic in one
    // of them leaves nothing half-written worth refusing to read.
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// The value presentation code should show: the draft if present, else
  /// the cached remote value.
  pub fn displayed(&self, key: &ResourceKey) -> Option<D> {
    let state = self.lock();
    state
      .drafts
      .get(key)
      .or_else(|| state.cache.get(key))
      .cloned()
  }

  pub fn draft(&self, key: &ResourceKey) -> Option<D> {
    self.lock().drafts.get(key).cloned()
  }

  pub fn has_draft(&self, key: &ResourceKey) -> bool {
    self.lock().drafts.contains(key)
  }

  /// Set or clear the draft.
  ///
  /// Setting a draft cancels any in-flight fetch for the key, since its
  /// result could no longer be shown.
  pub fn set_draft(&self, key: &ResourceKey, value: Option<D>) {
    let mut state = self.lock();
    if value.is_some() {
      state.cache.cancel_in_flight_fetch(key);
    }
    state.drafts.set(key, value);
  }

  pub fn cached(&self, key: &ResourceKey) -> Option<D> {
    self.lock().cache.get(key).cloned()
  }

  pub fn entry(&self, key: &ResourceKey) -> Option<CacheEntry<D>> {
    self.lock().cache.entry(key).cloned()
  }

  pub fn invalidate(&self, key: &ResourceKey) {
    self.lock().cache.invalidate(key);
  }

  pub fn is_stale(&self, key: &ResourceKey) -> bool {
    self.lock().cache.is_stale(key)
  }

  pub fn is_fetching(&self, key: &ResourceKey) -> bool {
    self.lock().cache.is_fetching(key)
  }

  pub fn is_saving(&self, key: &ResourceKey) -> bool {
    self.lock().saving.contains(key)
  }

  pub fn cancel_in_flight_fetch(&self, key: &ResourceKey) -> bool {
    self.lock().cache.cancel_in_flight_fetch(key)
  }

  /// Register a fetch if the key is eligible for one.
  ///
  /// A key is eligible only when it has no draft, no fetch already in
  /// flight and no save in flight.
  pub fn begin_fetch(&self, key: &ResourceKey) -> Option<FetchTicket> {
    let mut state = self.lock();
    if state.drafts.contains(key) || state.saving.contains(key) {
      return None;
    }
    state.cache.begin_fetch(key)
  }

  /// Store a fetch result unless a draft exists or the ticket is stale.
  pub fn complete_fetch(
    &self,
    key: &ResourceKey,
    ticket: FetchTicket,
    value: Option<D>,
  ) -> Result<(), FetchDiscard> {
    let mut state = self.lock();
    if state.drafts.contains(key) {
      state.cache.fail_fetch(key, ticket);
      return Err(FetchDiscard::DraftPresent);
    }
    if state.cache.complete_fetch(key, ticket, value) {
      Ok(())
    } else {
      Err(FetchDiscard::Superseded)
    }
  }

  pub fn fail_fetch(&self, key: &ResourceKey, ticket: FetchTicket) {
    self.lock().cache.fail_fetch(key, ticket);
  }

  /// Start a save from the current draft. See [`PendingMutation::begin`].
  pub fn begin_mutation(&self, key: &ResourceKey) -> Option<PendingMutation<D>> {
    let mut state = self.lock();
    let StoreState {
      drafts,
      cache,
      saving,
    } = &mut *state;
    let pending = PendingMutation::begin(key, drafts, cache)?;
    saving.insert(key.clone());
    Some(pending)
  }

  /// Settle a save. See [`PendingMutation::settle`].
  pub fn settle_mutation(&self, pending: PendingMutation<D>, accepted: bool) -> Settled {
    let mut state = self.lock();
    let StoreState {
      drafts,
      cache,
      saving,
    } = &mut *state;
    saving.remove(pending.key());
    pending.settle(accepted, drafts, cache)
  }
}
