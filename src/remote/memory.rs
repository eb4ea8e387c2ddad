//! In-memory mock server.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::Remote;
use crate::sync::ResourceKey;

#[derive(Debug)]
struct MemoryState<D> {
  values: HashMap<ResourceKey, D>,
  latency: Duration,
  reject_writes: bool,
  reject_next_writes: usize,
  fail_next_fetches: usize,
  fetch_calls: usize,
  write_calls: usize,
}

/// Mock server that keeps values in memory.
///
/// Supports artificial latency and scripted failures so the engine's
/// rollback and retry paths can be driven by hand or from tests.
#[derive(Debug)]
pub struct MemoryRemote<D> {
  state: Arc<Mutex<MemoryState<D>>>,
}

impl<D> Clone for MemoryRemote<D> {
  fn clone(&self) -> Self {
    Self {
      state: Arc::clone(&self.state),
    }
  }
}

impl<D> Default for MemoryRemote<D> {
  fn default() -> Self {
    Self {
      state: Arc::new(Mutex::new(MemoryState {
        values: HashMap::new(),
        latency: Duration::ZERO,
        reject_writes: false,
        reject_next_writes: 0,
        fail_next_fetches: 0,
        fetch_calls: 0,
        write_calls: 0,
      })),
    }
  }
}

impl<D: Clone> MemoryRemote<D> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Delay every fetch and write by `latency`.
  pub fn with_latency(self, latency: Duration) -> Self {
    self.lock().latency = latency;
    self
  }

  fn lock(&self) -> MutexGuard<'_, MemoryState<D>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Server-side value for `key`.
  pub fn get(&self, key: &ResourceKey) -> Option<D> {
    self.lock().values.get(key).cloned()
  }

  /// Change the server-side value, as another client would.
  pub fn set(&self, key: &ResourceKey, value: Option<D>) {
    let mut state = self.lock();
    match value {
      Some(value) => state.values.insert(key.clone(), value),
      None => state.values.remove(key),
    };
  }

  /// Reject every write until switched off.
  pub fn set_reject_writes(&self, reject: bool) {
    self.lock().reject_writes = reject;
  }

  /// Reject the next `count` writes.
  pub fn reject_next_writes(&self, count: usize) {
    self.lock().reject_next_writes = count;
  }

  /// Fail the next `count` fetches with an error.
  pub fn fail_next_fetches(&self, count: usize) {
    self.lock().fail_next_fetches = count;
  }

  pub fn fetch_calls(&self) -> usize {
    self.lock().fetch_calls
  }

  pub fn write_calls(&self) -> usize {
    self.lock().write_calls
  }
}

impl<D: Clone + Send + Sync + 'static> Remote<D> for MemoryRemote<D> {
  fn fetch(&self, key: &ResourceKey) -> BoxFuture<'static, Result<Option<D>>> {
    let latency = {
      let mut state = self.lock();
      state.fetch_calls += 1;
      state.latency
    };
    let remote = self.clone();
    let key = key.clone();

    async move {
      if !latency.is_zero() {
        tokio::time::sleep(latency).await;
      }
      let mut state = remote.lock();
      if state.fail_next_fetches > 0 {
        state.fail_next_fetches -= 1;
        return Err(eyre!("Mock server unavailable while fetching {}", key));
      }
      Ok(state.values.get(&key).cloned())
    }
    .boxed()
  }

  fn write(&self, key: &ResourceKey, value: D) -> BoxFuture<'static, Result<bool>> {
    let latency = {
      let mut state = self.lock();
      state.write_calls += 1;
      state.latency
    };
    let remote = self.clone();
    let key = key.clone();

    async move {
      if !latency.is_zero() {
        tokio::time::sleep(latency).await;
      }
      let mut state = remote.lock();
      if state.reject_writes {
        return Ok(false);
      }
      if state.reject_next_writes > 0 {
        state.reject_next_writes -= 1;
        return Ok(false);
      }
      state.values.insert(key, value);
      Ok(true)
    }
    .boxed()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn key() -> ResourceKey {
    ResourceKey::from(["user", "data"])
  }

  #[tokio::test]
  async fn test_fetch_and_write() {
    let remote = MemoryRemote::new();
    assert_eq!(remote.fetch(&key()).await.unwrap(), None);

    assert!(remote.write(&key(), "Alice".to_string()).await.unwrap());
    assert_eq!(
      remote.fetch(&key()).await.unwrap().as_deref(),
      Some("Alice")
    );
    assert_eq!(remote.fetch_calls(), 2);
    assert_eq!(remote.write_calls(), 1);
  }

  #[tokio::test]
  async fn test_scripted_write_rejections() {
    let remote = MemoryRemote::new();
    remote.set(&key(), Some(1));
    remote.reject_next_writes(1);

    assert!(!remote.write(&key(), 2).await.unwrap());
    assert_eq!(remote.get(&key()), Some(1));
    assert!(remote.write(&key(), 3).await.unwrap());
    assert_eq!(remote.get(&key()), Some(3));

    remote.set_reject_writes(true);
    assert!(!remote.write(&key(), 4).await.unwrap());
    assert_eq!(remote.get(&key()), Some(3));
  }

  #[tokio::test]
  async fn test_scripted_fetch_failures() {
    let remote = MemoryRemote::new();
    remote.set(&key(), Some(1));
    remote.fail_next_fetches(1);

    assert!(remote.fetch(&key()).await.is_err());
    assert_eq!(remote.fetch(&key()).await.unwrap(), Some(1));
  }

  #[tokio::test(start_paused = true)]
  async fn test_latency() {
    let remote = MemoryRemote::new().with_latency(Duration::from_millis(200));
    remote.set(&key(), Some(1));

    let start = tokio::time::Instant::now();
    remote.fetch(&key()).await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(200));
  }
}
