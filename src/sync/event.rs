use chrono::{DateTime, Utc};

use super::key::ResourceKey;

/// Notification broadcast by the engine after state changes.
///
/// Failures are reported here for presentation code to surface; they are
/// never returned from engine calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
  /// Draft set or cleared locally
  Changed(ResourceKey),
  /// A fetch result was stored in the cache
  Fetched(ResourceKey),
  /// A fetch failed; the last known value is kept
  FetchFailed { key: ResourceKey, error: String },
  /// A save started; the cache now holds the optimistic value
  Saving(ResourceKey),
  /// The server accepted a save
  Saved(ResourceKey),
  /// The server rejected a save and the cache was rolled back
  SaveFailed {
    key: ResourceKey,
    error: String,
    /// Whether the failed value was put back as the draft
    draft_restored: bool,
  },
}

impl SyncEvent {
  pub fn key(&self) -> &ResourceKey {
    match self {
      SyncEvent::Changed(key)
      | SyncEvent::Fetched(key)
      | SyncEvent::Saving(key)
      | SyncEvent::Saved(key) => key,
      SyncEvent::FetchFailed { key, .. } | SyncEvent::SaveFailed { key, .. } => key,
    }
  }
}

/// Snapshot of a key's sync state, for status lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
  /// There is a local edit not yet handed to a save
  pub has_draft: bool,
  /// A write is in flight
  pub saving: bool,
  /// A fetch is in flight
  pub fetching: bool,
  /// The cached value is due for a refetch
  pub stale: bool,
  pub last_fetched_at: Option<DateTime<Utc>>,
}
