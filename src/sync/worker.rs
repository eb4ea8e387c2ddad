//! Per-key task that owns the debounce timer, the poller and the in-flight
//! fetch and save for one resource key.
//!
//! Every scheduling decision for a key happens on this task, so a key never
//! has two saves or two fetches in flight from the same engine. State is
//! always re-read from the store when a timer fires or a request settles.

use color_eyre::Result;
use futures::future::{BoxFuture, OptionFuture};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use super::cache::FetchTicket;
use super::debounce::Debouncer;
use super::engine::SyncConfig;
use super::event::SyncEvent;
use super::key::ResourceKey;
use super::mutation::{PendingMutation, Settled};
use super::poller::Poller;
use super::store::SyncStore;
use crate::remote::Remote;

/// Requests sent to a key's worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
  /// The draft changed; (re)arm the debounced save
  Edited,
  /// Save now, bypassing the debounce timer
  Flush,
  /// The entry was invalidated; refetch if eligible
  Refresh,
}

struct InFlightFetch<D> {
  ticket: FetchTicket,
  future: BoxFuture<'static, Result<Option<D>>>,
}

struct InFlightSave<D> {
  pending: PendingMutation<D>,
  future: BoxFuture<'static, Result<bool>>,
}

pub(crate) struct KeyWorker<D> {
  key: ResourceKey,
  store: SyncStore<D>,
  remote: Arc<dyn Remote<D>>,
  events: broadcast::Sender<SyncEvent>,
  debouncer: Debouncer,
  poller: Poller,
  fetch: Option<InFlightFetch<D>>,
  save: Option<InFlightSave<D>>,
  /// A save was requested while another was in flight
  save_queued: bool,
  shutting_down: bool,
}

impl<D: Clone + Send + Sync + 'static> KeyWorker<D> {
  pub(crate) fn new(
    key: ResourceKey,
    store: SyncStore<D>,
    remote: Arc<dyn Remote<D>>,
    events: broadcast::Sender<SyncEvent>,
    config: &SyncConfig,
  ) -> Self {
    Self {
      key,
      store,
      remote,
      events,
      debouncer: Debouncer::new(config.debounce_save_delay, config.max_save_delay),
      poller: Poller::new(config.auto_load_interval, config.auto_load),
      fetch: None,
      save: None,
      save_queued: false,
      shutting_down: false,
    }
  }

  /// Run until the command channel closes, then save any draft and wait
  /// for in-flight saves to settle.
  pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
    debug!(key = %self.key, "sync worker started");
    self.start_fetch();

    loop {
      let deadline = self.debouncer.deadline();

      tokio::select! {
        command = commands.recv() => match command {
          Some(Command::Edited) => self.on_edited(),
          Some(Command::Flush) => self.request_save(),
          Some(Command::Refresh) => self.refetch(),
          None => break,
        },
        _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
          if self.debouncer.fire(Instant::now()) {
            self.request_save();
          }
        }
        _ = self.poller.tick() => self.start_fetch(),
        result = OptionFuture::from(self.fetch.as_mut().map(|f| &mut f.future)), if self.fetch.is_some() => {
          if let Some(result) = result {
            self.finish_fetch(result);
          }
        }
        result = OptionFuture::from(self.save.as_mut().map(|s| &mut s.future)), if self.save.is_some() => {
          if let Some(result) = result {
            self.finish_save(result);
          }
        }
      }
    }

    self.drain().await;
    debug!(key = %self.key, "sync worker stopped");
  }

  fn on_edited(&mut self) {
    self.cancel_fetch();
    self.debouncer.notify(Instant::now());
  }

  fn emit(&self, event: SyncEvent) {
    // No subscribers is fine
    let _ = self.events.send(event);
  }

  fn start_fetch(&mut self) {
    if self.shutting_down {
      return;
    }
    let Some(ticket) = self.store.begin_fetch(&self.key) else {
      return;
    };
    debug!(key = %self.key, "fetching");
    let future = self.remote.fetch(&self.key);
    // Any future still held here belongs to a cancelled ticket
    self.fetch = Some(InFlightFetch { ticket, future });
  }

  fn cancel_fetch(&mut self) {
    if let Some(fetch) = self.fetch.take() {
      debug!(key = %self.key, "cancelling fetch");
      self.store.fail_fetch(&self.key, fetch.ticket);
    }
  }

  /// Supersede any in-flight fetch with a fresh one.
  fn refetch(&mut self) {
    self.cancel_fetch();
    self.start_fetch();
  }

  fn finish_fetch(&mut self, result: Result<Option<D>>) {
    let Some(InFlightFetch { ticket, .. }) = self.fetch.take() else {
      return;
    };

    match result {
      Ok(value) => match self.store.complete_fetch(&self.key, ticket, value) {
        Ok(()) => {
          debug!(key = %self.key, "fetched");
          self.emit(SyncEvent::Fetched(self.key.clone()));
        }
        Err(reason) => debug!(key = %self.key, ?reason, "discarding fetch result"),
      },
      Err(e) => {
        self.store.fail_fetch(&self.key, ticket);
        warn!(key = %self.key, error = %e, "fetch failed, keeping last known value");
        self.emit(SyncEvent::FetchFailed {
          key: self.key.clone(),
          error: e.to_string(),
        });
      }
    }
  }

  fn request_save(&mut self) {
    self.debouncer.cancel();

    if self.save.is_some() {
      debug!(key = %self.key, "save in flight, queueing");
      self.save_queued = true;
      return;
    }

    let Some(pending) = self.store.begin_mutation(&self.key) else {
      debug!(key = %self.key, "no draft, nothing to save");
      return;
    };
    // begin_mutation cancelled the ticket; drop the request too
    self.fetch = None;

    debug!(key = %self.key, "saving");
    let future = self.remote.write(&self.key, pending.target().clone());
    self.save = Some(InFlightSave { pending, future });
    self.emit(SyncEvent::Saving(self.key.clone()));
  }

  fn finish_save(&mut self, result: Result<bool>) {
    let Some(InFlightSave { pending, .. }) = self.save.take() else {
      return;
    };

    let error = match result {
      Ok(true) => None,
      Ok(false) => Some("write rejected by server".to_string()),
      Err(e) => Some(e.to_string()),
    };

    match self.store.settle_mutation(pending, error.is_none()) {
      Settled::Saved => {
        info!(key = %self.key, "saved");
        self.emit(SyncEvent::Saved(self.key.clone()));
      }
      settled => {
        let error = error.unwrap_or_default();
        warn!(key = %self.key, %error, ?settled, "save failed, rolled back");
        if settled == Settled::RolledBack {
          // The restored draft is a draft write like any other
          self.debouncer.notify(Instant::now());
        }
        self.emit(SyncEvent::SaveFailed {
          key: self.key.clone(),
          error,
          draft_restored: settled == Settled::RolledBack,
        });
      }
    }

    if std::mem::take(&mut self.save_queued) {
      self.request_save();
    }
    // The entry was invalidated; reconcile with the server if eligible
    self.start_fetch();
  }

  async fn drain(&mut self) {
    self.shutting_down = true;
    self.cancel_fetch();

    // Covers drafts written straight into the shared store too
    if self.debouncer.is_pending() || self.store.has_draft(&self.key) {
      self.request_save();
    }
    while let Some(save) = self.save.as_mut() {
      let result = (&mut save.future).await;
      self.finish_save(result);
    }
  }
}
