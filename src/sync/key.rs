//! Resource keys identifying one synchronizable value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Ordered, immutable tuple of identifier segments (e.g. `["user", "data"]`).
///
/// Equality is structural, so two bindings built from equal keys share the
/// same draft and cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ResourceKey {
  segments: Arc<[String]>,
}

impl ResourceKey {
  pub fn new<I, S>(segments: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      segments: segments.into_iter().map(Into::into).collect(),
    }
  }

  /// Parse a slash separated path such as `user/data`.
  ///
  /// Empty segments are dropped, so `/user//data/` is the same key.
  pub fn parse(path: &str) -> Self {
    Self::new(path.split('/').filter(|s| !s.is_empty()))
  }

  pub fn segments(&self) -> &[String] {
    &self.segments
  }

  pub fn is_empty(&self) -> bool {
    self.segments.is_empty()
  }
}

impl fmt::Display for ResourceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}]", self.segments.join(", "))
  }
}

impl From<Vec<String>> for ResourceKey {
  fn from(segments: Vec<String>) -> Self {
    Self::new(segments)
  }
}

impl From<ResourceKey> for Vec<String> {
  fn from(key: ResourceKey) -> Self {
    key.segments.to_vec()
  }
}

impl<const N: usize> From<[&str; N]> for ResourceKey {
  fn from(segments: [&str; N]) -> Self {
    Self::new(segments)
  }
}
