//! The draft synchronization engine: shared store, remote and per-key workers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::binding::Binding;
use super::event::{SyncEvent, SyncStatus};
use super::key::ResourceKey;
use super::store::SyncStore;
use super::worker::{Command, KeyWorker};
use crate::remote::Remote;

/// Timing knobs for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
  /// Quiet period after the last edit before a save fires
  pub debounce_save_delay: Duration,
  /// Longest a burst of edits can go unsaved, from its first edit
  pub max_save_delay: Duration,
  /// Period of background refetches while there is no draft
  pub auto_load_interval: Duration,
  /// Whether to refetch periodically at all. The initial load and the
  /// refetch after an invalidation happen either way.
  pub auto_load: bool,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      debounce_save_delay: Duration::from_millis(500),
      max_save_delay: Duration::from_millis(1000),
      auto_load_interval: Duration::from_millis(3000),
      auto_load: true,
    }
  }
}

impl SyncConfig {
  pub fn with_debounce_save_delay(mut self, delay: Duration) -> Self {
    self.debounce_save_delay = delay;
    self
  }

  pub fn with_max_save_delay(mut self, delay: Duration) -> Self {
    self.max_save_delay = delay;
    self
  }

  pub fn with_auto_load_interval(mut self, interval: Duration) -> Self {
    self.auto_load_interval = interval;
    self
  }

  pub fn with_auto_load(mut self, enabled: bool) -> Self {
    self.auto_load = enabled;
    self
  }
}

struct WorkerHandle {
  commands: mpsc::UnboundedSender<Command>,
  task: JoinHandle<()>,
}

/// Clonable handle to the sync engine.
///
/// Clones share the store, the remote and the per-key workers. Workers are
/// spawned on the current tokio runtime the first time a key is used.
pub struct SyncEngine<D> {
  store: SyncStore<D>,
  remote: Arc<dyn Remote<D>>,
  config: SyncConfig,
  workers: Arc<Mutex<HashMap<ResourceKey, WorkerHandle>>>,
  events: broadcast::Sender<SyncEvent>,
}

impl<D> Clone for SyncEngine<D> {
  fn clone(&self) -> Self {
    Self {
      store: self.store.clone(),
      remote: Arc::clone(&self.remote),
      config: self.config,
      workers: Arc::clone(&self.workers),
      events: self.events.clone(),
    }
  }
}

impl<D: Clone + Send + Sync + 'static> SyncEngine<D> {
  pub fn new<R: Remote<D>>(store: SyncStore<D>, remote: R, config: SyncConfig) -> Self {
    Self::with_shared_remote(store, Arc::new(remote), config)
  }

  pub fn with_shared_remote(
    store: SyncStore<D>,
    remote: Arc<dyn Remote<D>>,
    config: SyncConfig,
  ) -> Self {
    let (events, _) = broadcast::channel(64);
    Self {
      store,
      remote,
      config,
      workers: Arc::new(Mutex::new(HashMap::new())),
      events,
    }
  }

  pub fn store(&self) -> &SyncStore<D> {
    &self.store
  }

  /// Bind presentation code to `key`, starting its worker (and thereby its
  /// initial load) if needed.
  pub fn bind(&self, key: impl Into<ResourceKey>) -> Binding<D> {
    let key = key.into();
    self.ensure_worker(&mut self.workers(), &key);
    Binding::new(key, self.clone())
  }

  /// Draft if present, else the cached remote value.
  pub fn value(&self, key: &ResourceKey) -> Option<D> {
    self.store.displayed(key)
  }

  pub fn draft(&self, key: &ResourceKey) -> Option<D> {
    self.store.draft(key)
  }

  /// Set or clear the local draft.
  ///
  /// Setting a value (re)arms the debounced save; clearing does not save.
  pub fn set_draft(&self, key: &ResourceKey, value: Option<D>) {
    let edited = value.is_some();
    self.store.set_draft(key, value);
    if edited {
      self.send(key, Command::Edited);
    }
    let _ = self.events.send(SyncEvent::Changed(key.clone()));
  }

  /// Save the current draft now. A no-op without a draft.
  pub fn flush(&self, key: &ResourceKey) {
    self.send(key, Command::Flush);
  }

  /// Mark the cached value stale and refetch it if no draft is held.
  pub fn invalidate(&self, key: &ResourceKey) {
    self.store.invalidate(key);
    self.send(key, Command::Refresh);
  }

  pub fn status(&self, key: &ResourceKey) -> SyncStatus {
    let entry = self.store.entry(key);
    SyncStatus {
      has_draft: self.store.has_draft(key),
      saving: self.store.is_saving(key),
      fetching: entry.as_ref().is_some_and(|e| e.in_flight.is_some()),
      stale: entry.as_ref().map(|e| e.stale).unwrap_or(true),
      last_fetched_at: entry.and_then(|e| e.last_fetched_at),
    }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
    self.events.subscribe()
  }

  /// Stop all workers.
  ///
  /// Pending debounced edits are saved and in-flight saves are awaited
  /// before this returns. Using a key afterwards starts a new worker.
  pub async fn shutdown(&self) {
    let handles: Vec<(ResourceKey, WorkerHandle)> = self.workers().drain().collect();

    for (key, handle) in handles {
      drop(handle.commands);
      if let Err(e) = handle.task.await {
        warn!(key = %key, error = %e, "sync worker ended abnormally");
      }
    }
  }

  fn workers(&self) -> MutexGuard<'_, HashMap<ResourceKey, WorkerHandle>> {
    self.workers.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn ensure_worker<'a>(
    &self,
    workers: &'a mut HashMap<ResourceKey, WorkerHandle>,
    key: &ResourceKey,
  ) -> &'a WorkerHandle {
    let alive = workers
      .get(key)
      .is_some_and(|handle| !handle.commands.is_closed());

    if !alive {
      debug!(key = %key, "spawning sync worker");
      let (commands, rx) = mpsc::unbounded_channel();
      let worker = KeyWorker::new(
        key.clone(),
        self.store.clone(),
        Arc::clone(&self.remote),
        self.events.clone(),
        &self.config,
      );
      let task = tokio::spawn(worker.run(rx));
      workers.insert(key.clone(), WorkerHandle { commands, task });
    }

    &workers[key]
  }

  fn send(&self, key: &ResourceKey, command: Command) {
    let mut workers = self.workers();
    let handle = self.ensure_worker(&mut workers, key);
    if handle.commands.send(command).is_err() {
      warn!(key = %key, ?command, "sync worker is gone, dropping command");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::remote::MemoryRemote;
  use serde_json::{json, Value};
  use tokio::time::{sleep, Instant};

  fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
  }

  fn key() -> ResourceKey {
    ResourceKey::from(["user", "data"])
  }

  fn config() -> SyncConfig {
    SyncConfig::default()
      .with_debounce_save_delay(ms(500))
      .with_max_save_delay(ms(1000))
      .with_auto_load_interval(ms(3000))
  }

  fn setup(config: SyncConfig) -> (SyncEngine<Value>, MemoryRemote<Value>) {
    let remote = MemoryRemote::new();
    remote.set(&key(), Some(json!({ "name": "Alice" })));
    let engine = SyncEngine::new(SyncStore::new(), remote.clone(), config);
    (engine, remote)
  }

  #[tokio::test(start_paused = true)]
  async fn test_bind_loads_initial_value() {
    let (engine, remote) = setup(config());
    let binding = engine.bind(key());

    sleep(ms(10)).await;
    assert_eq!(binding.value(), Some(json!({ "name": "Alice" })));
    assert_eq!(remote.fetch_calls(), 1);
    assert!(!binding.status().stale);
    assert!(binding.status().last_fetched_at.is_some());
  }

  #[tokio::test(start_paused = true)]
  async fn test_debounced_save_fires_once_after_last_edit() {
    let (engine, remote) = setup(config());
    let binding = engine.bind(key());
    sleep(ms(10)).await;

    let t = Instant::now();
    binding.set_value(json!({ "name": "B" }));
    sleep(ms(100)).await;
    binding.set_value(json!({ "name": "Bo" }));
    sleep(ms(50)).await;
    binding.set_value(json!({ "name": "Bob" }));

    sleep_until_after(t, 640).await;
    assert_eq!(remote.write_calls(), 0);

    sleep_until_after(t, 660).await;
    assert_eq!(remote.write_calls(), 1);
    assert_eq!(remote.get(&key()), Some(json!({ "name": "Bob" })));

    sleep_until_after(t, 2000).await;
    assert_eq!(remote.write_calls(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_max_wait_saves_during_continuous_edits() {
    let (engine, remote) = setup(config());
    let binding = engine.bind(key());
    sleep(ms(10)).await;

    // An edit every 90ms, so no edit ever lands on a deadline
    let t = Instant::now();
    let edit = |n: u64| binding.set_value(json!({ "name": format!("edit {}", n) }));

    for n in 0..=11 {
      sleep_until_after(t, n * 90).await;
      edit(n);
    }
    sleep_until_after(t, 999).await;
    assert_eq!(remote.write_calls(), 0);

    // Edits never paused for 500ms, yet the ceiling forced a save
    sleep_until_after(t, 1001).await;
    assert_eq!(remote.write_calls(), 1);
    assert_eq!(remote.get(&key()), Some(json!({ "name": "edit 11" })));

    // The next burst starts at t+1080 and gets a full max wait of its own
    for n in 12..=23 {
      sleep_until_after(t, n * 90).await;
      edit(n);
    }
    sleep_until_after(t, 2079).await;
    assert_eq!(remote.write_calls(), 1);

    sleep_until_after(t, 2081).await;
    assert_eq!(remote.write_calls(), 2);
    assert_eq!(remote.get(&key()), Some(json!({ "name": "edit 23" })));
  }

  #[tokio::test(start_paused = true)]
  async fn test_save_success_scenario() {
    let (engine, remote) = setup(config());
    let binding = engine.bind(key());
    sleep(ms(10)).await;

    binding.set_value(json!({ "name": "Bob" }));
    assert_eq!(binding.value(), Some(json!({ "name": "Bob" })));
    assert_eq!(
      engine.store().cached(&key()),
      Some(json!({ "name": "Alice" }))
    );

    sleep(ms(600)).await;
    assert_eq!(engine.draft(&key()), None);
    assert_eq!(engine.store().cached(&key()), Some(json!({ "name": "Bob" })));
    assert_eq!(binding.value(), Some(json!({ "name": "Bob" })));

    // The post-save invalidation refetched and confirmed the value
    assert_eq!(remote.fetch_calls(), 2);
    assert!(!binding.status().stale);
  }

  #[tokio::test(start_paused = true)]
  async fn test_save_failure_scenario() {
    let (engine, remote) = setup(config());
    let mut events = engine.subscribe();
    let binding = engine.bind(key());
    sleep(ms(10)).await;

    remote.set_reject_writes(true);
    binding.set_value(json!({ "name": "Bob" }));
    sleep(ms(600)).await;

    assert_eq!(remote.write_calls(), 1);
    assert_eq!(
      engine.store().cached(&key()),
      Some(json!({ "name": "Alice" }))
    );
    assert_eq!(engine.draft(&key()), Some(json!({ "name": "Bob" })));
    assert_eq!(binding.value(), Some(json!({ "name": "Bob" })));

    let mut saw_failure = false;
    while let Ok(event) = events.try_recv() {
      if let SyncEvent::SaveFailed { draft_restored, .. } = event {
        assert!(draft_restored);
        saw_failure = true;
      }
    }
    assert!(saw_failure);

    // The restored draft can be retried once the server recovers
    remote.set_reject_writes(false);
    binding.save();
    sleep(ms(10)).await;
    assert_eq!(remote.get(&key()), Some(json!({ "name": "Bob" })));
    assert_eq!(engine.draft(&key()), None);
  }

  #[tokio::test(start_paused = true)]
  async fn test_rejected_save_is_retried_without_user_action() {
    let (engine, remote) = setup(config());
    let binding = engine.bind(key());
    sleep(ms(10)).await;

    remote.reject_next_writes(1);
    binding.set_value(json!({ "name": "Bob" }));

    // First attempt at t+510 is rejected and the draft restored
    sleep(ms(510)).await;
    assert_eq!(remote.write_calls(), 1);
    assert_eq!(engine.draft(&key()), Some(json!({ "name": "Bob" })));

    // The restored draft schedules its own save one debounce later
    sleep(ms(510)).await;
    assert_eq!(remote.write_calls(), 2);
    assert_eq!(remote.get(&key()), Some(json!({ "name": "Bob" })));
    assert_eq!(engine.draft(&key()), None);

    // With the draft gone, polling resumes
    let fetches = remote.fetch_calls();
    sleep(ms(60_000)).await;
    assert!(remote.fetch_calls() > fetches);
    assert_eq!(remote.write_calls(), 2);
    assert_eq!(binding.value(), Some(json!({ "name": "Bob" })));
  }

  #[tokio::test(start_paused = true)]
  async fn test_shutdown_saves_draft_without_pending_timer() {
    let (engine, remote) = setup(config());
    let _binding = engine.bind(key());
    sleep(ms(10)).await;

    // Written through the shared store, so the worker never saw an edit
    engine
      .store()
      .set_draft(&key(), Some(json!({ "name": "Erin" })));
    engine.shutdown().await;

    assert_eq!(remote.get(&key()), Some(json!({ "name": "Erin" })));
    assert_eq!(engine.draft(&key()), None);
  }

  #[tokio::test(start_paused = true)]
  async fn test_save_without_draft_is_noop() {
    let (engine, remote) = setup(config());
    let binding = engine.bind(key());
    sleep(ms(10)).await;

    binding.save();
    sleep(ms(10)).await;

    assert_eq!(remote.write_calls(), 0);
    assert_eq!(engine.draft(&key()), None);
    assert_eq!(binding.value(), Some(json!({ "name": "Alice" })));
  }

  #[tokio::test(start_paused = true)]
  async fn test_flush_bypasses_debounce() {
    let (engine, remote) = setup(config());
    let binding = engine.bind(key());
    sleep(ms(10)).await;

    binding.set_value(json!({ "name": "Bob" }));
    binding.save();
    sleep(ms(1)).await;
    assert_eq!(remote.write_calls(), 1);

    // The debounce timer was consumed by the flush
    sleep(ms(2000)).await;
    assert_eq!(remote.write_calls(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_polling_stops_while_draft_present() {
    let (engine, remote) = setup(
      config()
        .with_debounce_save_delay(ms(10_000))
        .with_max_save_delay(ms(10_000)),
    );
    let binding = engine.bind(key());
    sleep(ms(10)).await;
    assert_eq!(remote.fetch_calls(), 1);

    sleep(ms(3000)).await;
    assert_eq!(remote.fetch_calls(), 2);

    binding.set_value(json!({ "name": "Bob" }));
    remote.set(&key(), Some(json!({ "name": "Server" })));
    sleep(ms(6000)).await;

    assert_eq!(remote.fetch_calls(), 2);
    assert_eq!(binding.value(), Some(json!({ "name": "Bob" })));
    assert_eq!(
      engine.store().cached(&key()),
      Some(json!({ "name": "Alice" }))
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_polling_picks_up_server_changes() {
    let (engine, remote) = setup(config());
    let binding = engine.bind(key());
    sleep(ms(10)).await;

    remote.set(&key(), Some(json!({ "name": "Carol" })));
    sleep(ms(3000)).await;
    assert_eq!(binding.value(), Some(json!({ "name": "Carol" })));
  }

  #[tokio::test(start_paused = true)]
  async fn test_late_fetch_does_not_clobber_draft() {
    let remote = MemoryRemote::new().with_latency(ms(200));
    remote.set(&key(), Some(json!({ "name": "Alice" })));
    let engine = SyncEngine::new(SyncStore::new(), remote.clone(), config());
    let binding = engine.bind(key());

    // Initial fetch is still in flight
    sleep(ms(50)).await;
    binding.set_value(json!({ "name": "Bob" }));
    sleep(ms(300)).await;

    assert_eq!(binding.value(), Some(json!({ "name": "Bob" })));
    assert_eq!(engine.store().cached(&key()), None);
  }

  #[tokio::test(start_paused = true)]
  async fn test_fetch_failure_keeps_last_value() {
    let (engine, remote) = setup(config());
    let binding = engine.bind(key());
    sleep(ms(10)).await;

    remote.fail_next_fetches(1);
    remote.set(&key(), Some(json!({ "name": "Carol" })));
    sleep(ms(3000)).await;
    assert_eq!(binding.value(), Some(json!({ "name": "Alice" })));

    // Retried on the next interval
    sleep(ms(3000)).await;
    assert_eq!(binding.value(), Some(json!({ "name": "Carol" })));
  }

  #[tokio::test(start_paused = true)]
  async fn test_overlapping_saves_are_serialized() {
    let remote = MemoryRemote::new().with_latency(ms(200));
    remote.set(&key(), Some(json!({ "name": "Alice" })));
    let engine = SyncEngine::new(SyncStore::new(), remote.clone(), config());
    let binding = engine.bind(key());
    sleep(ms(250)).await;

    binding.set_value(json!({ "name": "Bob" }));
    binding.save();
    sleep(ms(50)).await;
    assert!(binding.status().saving);

    binding.set_value(json!({ "name": "Carol" }));
    binding.save();
    sleep(ms(50)).await;
    // Second save waits for the first
    assert_eq!(remote.write_calls(), 1);

    sleep(ms(500)).await;
    assert_eq!(remote.write_calls(), 2);
    assert_eq!(remote.get(&key()), Some(json!({ "name": "Carol" })));
    assert_eq!(binding.value(), Some(json!({ "name": "Carol" })));
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidate_refetches() {
    let (engine, remote) = setup(config().with_auto_load(false));
    let binding = engine.bind(key());
    sleep(ms(10)).await;

    remote.set(&key(), Some(json!({ "name": "Dave" })));
    sleep(ms(10_000)).await;
    assert_eq!(binding.value(), Some(json!({ "name": "Alice" })));

    binding.refresh();
    sleep(ms(10)).await;
    assert_eq!(binding.value(), Some(json!({ "name": "Dave" })));
  }

  #[tokio::test(start_paused = true)]
  async fn test_shutdown_flushes_pending_edit() {
    let (engine, remote) = setup(config());
    let binding = engine.bind(key());
    sleep(ms(10)).await;

    binding.set_value(json!({ "name": "Bob" }));
    sleep(ms(1)).await;
    engine.shutdown().await;

    assert_eq!(remote.get(&key()), Some(json!({ "name": "Bob" })));
  }

  #[tokio::test(start_paused = true)]
  async fn test_bindings_share_state_per_key() {
    let (engine, _remote) = setup(config());
    let a = engine.bind(key());
    let b = engine.bind(ResourceKey::parse("user/data"));
    sleep(ms(10)).await;

    a.set_value(json!({ "name": "Bob" }));
    assert_eq!(b.value(), Some(json!({ "name": "Bob" })));
  }

  async fn sleep_until_after(t: Instant, millis: u64) {
    tokio::time::sleep_until(t + ms(millis)).await;
  }
}
