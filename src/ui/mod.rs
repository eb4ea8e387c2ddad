pub mod components;
mod renderfns;

use crate::app::App;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};
use renderfns::{draw_header, status_label, truncate};

/// Main draw function
pub fn draw(frame: &mut Frame, app: &App) {
  let field_rows = app.fields().len() as u16 * 3;

  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1),          // Header
      Constraint::Length(field_rows), // Form fields
      Constraint::Min(4),             // Draft vs server
      Constraint::Length(1),          // Status bar
    ])
    .split(frame.area());

  draw_header(frame, chunks[0], &app.key_label(), app.remote_label());
  draw_fields(frame, chunks[1], app);
  draw_values(frame, chunks[2], app);
  draw_status_bar(frame, chunks[3], app);
}

fn draw_fields(frame: &mut Frame, area: Rect, app: &App) {
  let rows = Layout::default()
    .direction(Direction::Vertical)
    .constraints(app.fields().iter().map(|_| Constraint::Length(3)))
    .split(area);

  for (i, (field, row)) in app.fields().iter().zip(rows.iter()).enumerate() {
    let selected = i == app.selected();
    let border_style = if selected {
      Style::default().fg(Color::Cyan)
    } else {
      Style::default().fg(Color::DarkGray)
    };

    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(border_style)
      .title(format!(" {} ", field.name));
    let paragraph = Paragraph::new(field.input.value()).block(block);
    frame.render_widget(paragraph, *row);

    if selected {
      let x = row.x + 1 + field.input.cursor_position() as u16;
      let max_x = row.x + row.width.saturating_sub(2);
      frame.set_cursor_position((x.min(max_x), row.y + 1));
    }
  }
}

/// Local draft next to the last server value
fn draw_values(frame: &mut Frame, area: Rect, app: &App) {
  let columns = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
    .split(area);

  let width = columns[0].width.saturating_sub(2) as usize;
  let none = || Span::styled("(none)", Style::default().fg(Color::DarkGray));

  let draft = match app.draft_json() {
    Some(json) => Span::styled(truncate(&json, width), Style::default().fg(Color::Magenta)),
    None => none(),
  };
  let cached = match app.cached_json() {
    Some(json) => Span::raw(truncate(&json, width)),
    None => none(),
  };

  frame.render_widget(
    Paragraph::new(draft).block(Block::default().borders(Borders::ALL).title(" draft ")),
    columns[0],
  );
  frame.render_widget(
    Paragraph::new(cached).block(Block::default().borders(Borders::ALL).title(" server ")),
    columns[1],
  );
}

fn draw_status_bar(frame: &mut Frame, area: Rect, app: &App) {
  let status = app.status();
  let (label, color) = status_label(&status);

  let mut spans = vec![Span::styled(
    format!(" {} ", label),
    Style::default().fg(Color::Black).bg(color),
  )];

  if let Some(at) = status.last_fetched_at {
    spans.push(Span::styled(
      format!("  fetched {}", at.with_timezone(&chrono::Local).format("%H:%M:%S")),
      Style::default().fg(Color::DarkGray),
    ));
  }

  if let Some((message, color)) = app.message() {
    spans.push(Span::raw("  "));
    spans.push(Span::styled(message.clone(), Style::default().fg(*color)));
  }

  frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
