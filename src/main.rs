mod app;
mod event;
mod logging;
mod ui;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use draftsync::config::Config;
use draftsync::remote::{HttpRemote, MemoryRemote, Remote};
use draftsync::sync::{Binding, ResourceKey, SyncEngine, SyncEvent, SyncStore};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

/// How long headless mode waits for the server before giving up
const HEADLESS_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "draftsync")]
#[command(about = "Edit a server-owned value while it syncs in the background")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/draftsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Base URL of the HTTP remote; without one an in-memory mock is used
  #[arg(short, long)]
  url: Option<String>,

  /// Resource key to edit, slash separated (e.g. user/data)
  #[arg(short, long)]
  key: Option<String>,

  /// Write logs to stderr instead of the log file
  #[arg(long)]
  log_stderr: bool,

  /// Apply the --set edits, save, print the result and exit
  #[arg(long)]
  headless: bool,

  /// Field edit for headless mode, as field=value (repeatable)
  #[arg(long = "set", value_name = "FIELD=VALUE")]
  edits: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let target = if args.log_stderr {
    logging::LogTarget::Stderr
  } else {
    logging::LogTarget::File
  };
  let _log_guard = logging::init(target)?;

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Command line overrides
  if let Some(url) = args.url {
    config.remote.url = Some(url);
  }
  if let Some(key) = args.key {
    config.form.key = ResourceKey::parse(&key);
  }
  config.validate()?;

  let edits = args
    .edits
    .iter()
    .map(|edit| parse_edit(edit))
    .collect::<Result<Vec<_>>>()?;

  let (remote, remote_label) = build_remote(&config)?;
  let engine = SyncEngine::with_shared_remote(
    SyncStore::new(),
    remote,
    config.sync.to_sync_config(),
  );
  info!(key = %config.form.key, remote = %remote_label, "starting");

  if args.headless {
    // Subscribe before binding so the initial load is not missed
    let events = engine.subscribe();
    let binding = engine.bind(config.form.key.clone());
    let result = run_headless(&binding, events, &edits).await;
    engine.shutdown().await;
    result?;

    let value = binding.value().unwrap_or(Value::Null);
    println!("{}", serde_json::to_string_pretty(&value)?);
    return Ok(());
  }

  let binding = engine.bind(config.form.key.clone());
  let mut app = app::App::new(engine.clone(), binding, &config.form.fields, remote_label);
  let result = app.run().await;

  // Save whatever is still pending before exiting
  engine.shutdown().await;
  result
}

fn build_remote(config: &Config) -> Result<(Arc<dyn Remote<Value>>, String)> {
  if let Some(url) = &config.remote.url {
    let remote: Arc<dyn Remote<Value>> = Arc::new(HttpRemote::new(url)?);
    return Ok((remote, url.clone()));
  }

  let remote = MemoryRemote::new()
    .with_latency(Duration::from_millis(config.remote.mock_latency_ms));
  remote.set(&config.form.key, Some(config.form.initial.clone()));
  remote.set_reject_writes(config.remote.mock_reject_writes);

  let label = if config.remote.mock_reject_writes {
    format!("mock ({}ms, rejecting)", config.remote.mock_latency_ms)
  } else {
    format!("mock ({}ms)", config.remote.mock_latency_ms)
  };
  let remote: Arc<dyn Remote<Value>> = Arc::new(remote);
  Ok((remote, label))
}

/// Split `field=value`
fn parse_edit(edit: &str) -> Result<(String, String)> {
  match edit.split_once('=') {
    Some((field, value)) if !field.is_empty() => Ok((field.to_string(), value.to_string())),
    _ => Err(eyre!("Invalid edit '{}', expected FIELD=VALUE", edit)),
  }
}

async fn run_headless(
  binding: &Binding<Value>,
  mut events: broadcast::Receiver<SyncEvent>,
  edits: &[(String, String)],
) -> Result<()> {
  wait_for(&mut events, binding.key(), |event| match event {
    SyncEvent::Fetched(_) => Some(Ok(())),
    SyncEvent::FetchFailed { error, .. } => Some(Err(eyre!("Initial load failed: {}", error))),
    _ => None,
  })
  .await?;

  if edits.is_empty() {
    return Ok(());
  }

  let mut value = binding.value();
  for (field, text) in edits {
    value = Some(app::with_field(value, field, text.clone()));
  }
  if let Some(value) = value {
    binding.set_value(value);
  }
  binding.save();

  wait_for(&mut events, binding.key(), |event| match event {
    SyncEvent::Saved(_) => Some(Ok(())),
    SyncEvent::SaveFailed { error, .. } => Some(Err(eyre!("Save failed: {}", error))),
    _ => None,
  })
  .await
}

/// Wait until `outcome` maps an event for `key` to a result.
async fn wait_for<F>(
  events: &mut broadcast::Receiver<SyncEvent>,
  key: &ResourceKey,
  outcome: F,
) -> Result<()>
where
  F: Fn(&SyncEvent) -> Option<Result<()>>,
{
  let wait = async {
    loop {
      match events.recv().await {
        Ok(event) if event.key() == key => {
          if let Some(result) = outcome(&event) {
            return result;
          }
        }
        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
        Err(broadcast::error::RecvError::Closed) => {
          return Err(eyre!("Sync engine stopped"));
        }
      }
    }
  };

  tokio::time::timeout(HEADLESS_TIMEOUT, wait)
    .await
    .map_err(|_| eyre!("Timed out waiting for {}", key))?
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_edit() {
    assert_eq!(
      parse_edit("name=Bob").unwrap(),
      ("name".to_string(), "Bob".to_string())
    );
    assert_eq!(
      parse_edit("note=a=b").unwrap(),
      ("note".to_string(), "a=b".to_string())
    );
    assert_eq!(parse_edit("name=").unwrap().1, "");
    assert!(parse_edit("name").is_err());
    assert!(parse_edit("=Bob").is_err());
  }

  #[tokio::test(start_paused = true)]
  async fn test_headless_edit_against_mock() {
    let config = Config::default();
    let (remote, _) = build_remote(&config).unwrap();
    let engine = SyncEngine::with_shared_remote(
      SyncStore::new(),
      remote,
      config.sync.to_sync_config(),
    );

    let events = engine.subscribe();
    let binding = engine.bind(config.form.key.clone());
    let edits = vec![("name".to_string(), "Bob".to_string())];
    run_headless(&binding, events, &edits).await.unwrap();
    engine.shutdown().await;

    assert_eq!(
      binding.value(),
      Some(serde_json::json!({ "name": "Bob", "email": "alice@example.com" }))
    );
  }
}
