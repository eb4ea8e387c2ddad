//! Last known server value per resource key, with staleness bookkeeping.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::key::ResourceKey;

/// Identifies one issued fetch.
///
/// A fetch result is only applied if its ticket is still the in-flight one
/// for the key; cancelling or superseding a fetch invalidates its ticket, so
/// a late response is dropped instead of overwriting newer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket(u64);

/// Cached server state for a single key.
#[derive(Debug, Clone)]
pub struct CacheEntry<D> {
  /// Last value fetched from or written to the server
  pub value: Option<D>,
  /// When a fetch last completed successfully
  pub last_fetched_at: Option<DateTime<Utc>>,
  /// Set while a fetch is outstanding
  pub in_flight: Option<FetchTicket>,
  /// The value should be refetched before it is trusted
  pub stale: bool,
}

impl<D> Default for CacheEntry<D> {
  fn default() -> Self {
    Self {
      value: None,
      last_fetched_at: None,
      in_flight: None,
      // Nothing has been loaded yet
      stale: true,
    }
  }
}

/// Keyed cache of remote values.
#[derive(Debug)]
pub struct RemoteCache<D> {
  entries: HashMap<ResourceKey, CacheEntry<D>>,
  next_ticket: u64,
}

impl<D> Default for RemoteCache<D> {
  fn default() -> Self {
    Self {
      entries: HashMap::new(),
      next_ticket: 0,
    }
  }
}

impl<D> RemoteCache<D> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, key: &ResourceKey) -> Option<&D> {
    self.entries.get(key).and_then(|e| e.value.as_ref())
  }

  pub fn entry(&self, key: &ResourceKey) -> Option<&CacheEntry<D>> {
    self.entries.get(key)
  }

  /// Overwrite the cached value.
  ///
  /// Used for optimistic writes and rollbacks; staleness and fetch
  /// bookkeeping are left alone.
  pub fn set(&mut self, key: &ResourceKey, value: Option<D>) {
    self.entries.entry(key.clone()).or_default().value = value;
  }

  /// Mark the entry stale so the next eligible read path refetches it.
  pub fn invalidate(&mut self, key: &ResourceKey) {
    self.entries.entry(key.clone()).or_default().stale = true;
  }

  pub fn is_stale(&self, key: &ResourceKey) -> bool {
    self.entries.get(key).map(|e| e.stale).unwrap_or(true)
  }

  pub fn is_fetching(&self, key: &ResourceKey) -> bool {
    self
      .entries
      .get(key)
      .map(|e| e.in_flight.is_some())
      .unwrap_or(false)
  }

  /// Register a new fetch for `key`.
  ///
  /// Returns `None` if one is already in flight; fetches are never queued.
  pub fn begin_fetch(&mut self, key: &ResourceKey) -> Option<FetchTicket> {
    let ticket = FetchTicket(self.next_ticket);
    let entry = self.entries.entry(key.clone()).or_default();
    if entry.in_flight.is_some() {
      return None;
    }
    entry.in_flight = Some(ticket);
    self.next_ticket += 1;
    Some(ticket)
  }

  /// Forget the in-flight fetch for `key`. Returns whether one was cancelled.
  pub fn cancel_in_flight_fetch(&mut self, key: &ResourceKey) -> bool {
    self
      .entries
      .get_mut(key)
      .and_then(|e| e.in_flight.take())
      .is_some()
  }

  /// Store a fetch result if `ticket` is still current.
  pub fn complete_fetch(&mut self, key: &ResourceKey, ticket: FetchTicket, value: Option<D>) -> bool {
    let Some(entry) = self.entries.get_mut(key) else {
      return false;
    };
    if entry.in_flight != Some(ticket) {
      return false;
    }
    entry.in_flight = None;
    entry.value = value;
    entry.stale = false;
    entry.last_fetched_at = Some(Utc::now());
    true
  }

  /// Clear a failed fetch, keeping the last known value.
  pub fn fail_fetch(&mut self, key: &ResourceKey, ticket: FetchTicket) -> bool {
    match self.entries.get_mut(key) {
      Some(entry) if entry.in_flight == Some(ticket) => {
        entry.in_flight = None;
        true
      }
      _ => false,
    }
  }
}
