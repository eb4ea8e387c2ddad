//! JSON-over-HTTP remote.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

use super::Remote;
use crate::sync::ResourceKey;

/// Remote that maps each resource key to a URL path under `base`.
///
/// `["user", "data"]` becomes `GET/PUT {base}/user/data`. A `404` on fetch
/// means the server holds no value.
#[derive(Clone, Debug)]
pub struct HttpRemote {
  client: reqwest::Client,
  base: Url,
}

impl HttpRemote {
  pub fn new(base: &str) -> Result<Self> {
    let base = Url::parse(base).map_err(|e| eyre!("Invalid remote URL {}: {}", base, e))?;
    if base.cannot_be_a_base() {
      return Err(eyre!("Remote URL {} cannot be used as a base", base));
    }

    let client = reqwest::Client::builder()
      .user_agent(concat!("draftsync/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, base })
  }

  /// URL for a resource key; segments are percent-encoded.
  pub fn resource_url(&self, key: &ResourceKey) -> Result<Url> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| eyre!("Remote URL {} cannot be used as a base", self.base))?
      .pop_if_empty()
      .extend(key.segments());
    Ok(url)
  }
}

impl<D> Remote<D> for HttpRemote
where
  D: Serialize + DeserializeOwned + Send + Sync + 'static,
{
  fn fetch(&self, key: &ResourceKey) -> BoxFuture<'static, Result<Option<D>>> {
    let client = self.client.clone();
    let url = self.resource_url(key);

    async move {
      let url = url?;
      let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| eyre!("Failed to fetch {}: {}", url, e))?;

      if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
      }

      let response = response
        .error_for_status()
        .map_err(|e| eyre!("Failed to fetch {}: {}", url, e))?;
      let value = response
        .json::<D>()
        .await
        .map_err(|e| eyre!("Failed to parse response from {}: {}", url, e))?;

      Ok(Some(value))
    }
    .boxed()
  }

  fn write(&self, key: &ResourceKey, value: D) -> BoxFuture<'static, Result<bool>> {
    let client = self.client.clone();
    let url = self.resource_url(key);

    async move {
      let url = url?;
      let response = client
        .put(url.clone())
        .json(&value)
        .send()
        .await
        .map_err(|e| eyre!("Failed to write {}: {}", url, e))?;

      Ok(response.status().is_success())
    }
    .boxed()
  }
}
