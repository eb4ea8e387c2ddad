use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use draftsync::sync::SyncEvent;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// Application events
#[derive(Debug)]
pub enum Event {
  /// Terminal key press
  Key(KeyEvent),
  /// Periodic tick for UI refresh
  Tick,
  /// Something changed in the sync engine
  Sync(SyncEvent),
}

/// Event handler that merges terminal input, a tick timer and sync events
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration, mut sync_events: broadcast::Receiver<SyncEvent>) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // crossterm polling blocks, so it gets its own thread
    let input_tx = tx.clone();
    tokio::task::spawn_blocking(move || loop {
      if event::poll(tick_rate).unwrap_or(false) {
        if let Ok(CrosstermEvent::Key(key)) = event::read() {
          if key.kind == KeyEventKind::Press && input_tx.send(Event::Key(key)).is_err() {
            break;
          }
        }
      } else if input_tx.send(Event::Tick).is_err() {
        break;
      }
    });

    tokio::spawn(async move {
      loop {
        match sync_events.recv().await {
          Ok(evt) => {
            if tx.send(Event::Sync(evt)).is_err() {
              break;
            }
          }
          // Missed some; the next redraw reads current state anyway
          Err(broadcast::error::RecvError::Lagged(_)) => continue,
          Err(broadcast::error::RecvError::Closed) => break,
        }
      }
    });

    Self { rx }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
