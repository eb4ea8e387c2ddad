use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::{ResourceKey, SyncConfig};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub sync: SyncSettings,
  pub remote: RemoteSettings,
  pub form: FormSettings,
}

/// Engine timing, in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
  pub debounce_save_delay_ms: u64,
  pub max_save_delay_ms: u64,
  pub auto_load_interval_ms: u64,
  /// Refetch periodically while there is no local edit
  pub auto_load: bool,
}

impl Default for SyncSettings {
  fn default() -> Self {
    Self {
      debounce_save_delay_ms: 500,
      max_save_delay_ms: 1000,
      auto_load_interval_ms: 3000,
      auto_load: true,
    }
  }
}

impl SyncSettings {
  pub fn to_sync_config(&self) -> SyncConfig {
    SyncConfig::default()
      .with_debounce_save_delay(Duration::from_millis(self.debounce_save_delay_ms))
      .with_max_save_delay(Duration::from_millis(self.max_save_delay_ms))
      .with_auto_load_interval(Duration::from_millis(self.auto_load_interval_ms))
      .with_auto_load(self.auto_load)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
  /// Base URL of the HTTP remote. Without one, an in-memory mock server is used.
  pub url: Option<String>,
  /// Artificial latency of the mock server
  pub mock_latency_ms: u64,
  /// Make the mock server reject every write
  pub mock_reject_writes: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FormSettings {
  /// Resource key the form edits
  pub key: ResourceKey,
  /// String fields of the value shown as inputs
  pub fields: Vec<String>,
  /// Value the mock server starts with
  pub initial: Value,
}

impl Default for FormSettings {
  fn default() -> Self {
    Self {
      key: ResourceKey::from(["user", "data"]),
      fields: vec!["name".to_string(), "email".to_string()],
      initial: serde_json::json!({
        "name": "Alice",
        "email": "alice@example.com",
      }),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./draftsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/draftsync/config.yaml
  ///
  /// Defaults are used when no file is found, except for an explicit path
  /// that does not exist.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.validate()?;

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("draftsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("draftsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  pub fn validate(&self) -> Result<()> {
    let sync = &self.sync;
    if sync.debounce_save_delay_ms == 0 {
      return Err(eyre!("sync.debounce_save_delay_ms must be greater than 0"));
    }
    if sync.max_save_delay_ms < sync.debounce_save_delay_ms {
      return Err(eyre!(
        "sync.max_save_delay_ms ({}) must not be shorter than sync.debounce_save_delay_ms ({})",
        sync.max_save_delay_ms,
        sync.debounce_save_delay_ms
      ));
    }
    if sync.auto_load && sync.auto_load_interval_ms == 0 {
      return Err(eyre!("sync.auto_load_interval_ms must be greater than 0"));
    }
    if self.form.key.is_empty() {
      return Err(eyre!("form.key must have at least one segment"));
    }
    Ok(())
  }
}
