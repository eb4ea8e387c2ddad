use crate::event::{Event, EventHandler};
use crate::ui;
use crate::ui::components::{InputResult, TextInput};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use draftsync::sync::{Binding, SyncEngine, SyncEvent, SyncStatus};
use ratatui::prelude::*;
use serde_json::{Map, Value};
use std::io::stdout;
use std::time::Duration;
use tracing::debug;

/// One editable string field of the bound value
#[derive(Debug, Clone)]
pub struct Field {
  pub name: String,
  pub input: TextInput,
}

/// Main application state
pub struct App {
  engine: SyncEngine<Value>,
  binding: Binding<Value>,
  fields: Vec<Field>,
  selected: usize,
  /// Description of the remote, for the header
  remote_label: String,
  /// Last notable sync event, for the status bar
  message: Option<(String, Color)>,
  should_quit: bool,
}

impl App {
  pub fn new(
    engine: SyncEngine<Value>,
    binding: Binding<Value>,
    field_names: &[String],
    remote_label: String,
  ) -> Self {
    let fields = field_names
      .iter()
      .map(|name| Field {
        name: name.clone(),
        input: TextInput::new(),
      })
      .collect();

    let mut app = Self {
      engine,
      binding,
      fields,
      selected: 0,
      remote_label,
      message: None,
      should_quit: false,
    };
    app.sync_inputs();
    app
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut events = EventHandler::new(Duration::from_millis(250), self.engine.subscribe());

    let result = async {
      // Main loop
      while !self.should_quit {
        terminal.draw(|frame| ui::draw(frame, self))?;

        match events.next().await {
          Some(event) => self.handle_event(event),
          None => break,
        }
      }
      Ok::<_, color_eyre::Report>(())
    }
    .await;

    // Cleanup terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => {}
      Event::Sync(sync_event) => self.handle_sync_event(sync_event),
    }
    self.sync_inputs();
  }

  fn handle_key(&mut self, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    match key.code {
      KeyCode::Esc => self.should_quit = true,
      KeyCode::Char('c') if ctrl => self.should_quit = true,
      KeyCode::Char('s') if ctrl => self.binding.save(),
      KeyCode::Char('r') if ctrl => self.binding.refresh(),
      KeyCode::Char('d') if ctrl => self.binding.discard(),
      KeyCode::Up | KeyCode::BackTab => self.move_selection(-1),
      KeyCode::Down | KeyCode::Tab | KeyCode::Enter => self.move_selection(1),
      _ => self.edit_selected(key),
    }
  }

  fn edit_selected(&mut self, key: KeyEvent) {
    let Some(field) = self.fields.get_mut(self.selected) else {
      return;
    };
    if field.input.handle_key(key) != InputResult::Changed {
      return;
    }

    let name = field.name.clone();
    let text = field.input.value().to_string();
    self
      .binding
      .set_value(with_field(self.binding.value(), &name, text));
  }

  fn handle_sync_event(&mut self, event: SyncEvent) {
    if event.key() != self.binding.key() {
      return;
    }
    debug!(?event, "sync event");

    self.message = match event {
      SyncEvent::Saved(_) => Some(("saved".to_string(), Color::Green)),
      SyncEvent::SaveFailed {
        error,
        draft_restored,
        ..
      } => {
        let suffix = if draft_restored {
          ", edit kept, retrying"
        } else {
          ""
        };
        Some((format!("save failed: {}{}", error, suffix), Color::Red))
      }
      SyncEvent::FetchFailed { error, .. } => {
        Some((format!("refresh failed: {}", error), Color::Yellow))
      }
      _ => return,
    };
  }

  /// Make every input show the binding's current value.
  fn sync_inputs(&mut self) {
    let value = self.binding.value();
    for field in &mut self.fields {
      let text = field_text(value.as_ref(), &field.name);
      if field.input.value() != text {
        field.input.set_value(&text);
      }
    }
  }

  fn move_selection(&mut self, delta: i32) {
    let len = self.fields.len();
    if len > 0 {
      self.selected = (self.selected as i32 + delta).rem_euclid(len as i32) as usize;
    }
  }

  // Accessors for UI rendering
  pub fn fields(&self) -> &[Field] {
    &self.fields
  }

  pub fn selected(&self) -> usize {
    self.selected
  }

  pub fn remote_label(&self) -> &str {
    &self.remote_label
  }

  pub fn key_label(&self) -> String {
    self.binding.key().to_string()
  }

  pub fn status(&self) -> SyncStatus {
    self.binding.status()
  }

  pub fn message(&self) -> Option<&(String, Color)> {
    self.message.as_ref()
  }

  pub fn draft_json(&self) -> Option<String> {
    self.engine.draft(self.binding.key()).map(|v| v.to_string())
  }

  pub fn cached_json(&self) -> Option<String> {
    self
      .engine
      .store()
      .cached(self.binding.key())
      .map(|v| v.to_string())
  }
}

/// String content of `name` in `value`; non-string values render as JSON.
pub fn field_text(value: Option<&Value>, name: &str) -> String {
  match value.and_then(|v| v.get(name)) {
    Some(Value::String(s)) => s.clone(),
    Some(Value::Null) | None => String::new(),
    Some(other) => other.to_string(),
  }
}

/// `value` with field `name` set to `text`, keeping the other fields.
pub fn with_field(value: Option<Value>, name: &str, text: String) -> Value {
  let mut object = match value {
    Some(Value::Object(map)) => map,
    _ => Map::new(),
  };
  object.insert(name.to_string(), Value::String(text));
  Value::Object(object)
}
