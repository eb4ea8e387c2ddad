use draftsync::sync::SyncStatus;
use ratatui::prelude::Color;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Short label and color summarizing where the value stands
pub fn status_label(status: &SyncStatus) -> (&'static str, Color) {
  if status.saving {
    ("saving", Color::Yellow)
  } else if status.has_draft {
    ("edited", Color::Magenta)
  } else if status.fetching {
    ("loading", Color::Cyan)
  } else if status.stale {
    ("stale", Color::DarkGray)
  } else {
    ("synced", Color::Green)
  }
}
