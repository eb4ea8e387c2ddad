//! Remote collaborators the sync engine reads from and writes to.
//!
//! The engine only needs two operations per resource key: fetch the current
//! server value and write a new one. Implementations return `'static`
//! futures so the engine can hold and cancel them by dropping.

mod http;
mod memory;

pub use http::HttpRemote;
pub use memory::MemoryRemote;

use color_eyre::Result;
use futures::future::BoxFuture;

use crate::sync::ResourceKey;

/// Source of truth for synchronized values.
pub trait Remote<D>: Send + Sync + 'static {
  /// Current server value for `key`, or `None` if the server has none.
  fn fetch(&self, key: &ResourceKey) -> BoxFuture<'static, Result<Option<D>>>;

  /// Persist `value` for `key`. Resolves to whether the server accepted it;
  /// an error counts as a rejected write.
  fn write(&self, key: &ResourceKey, value: D) -> BoxFuture<'static, Result<bool>>;
}
