use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the header bar with logo, resource key, remote and shortcuts
pub fn draw_header(frame: &mut Frame, area: Rect, key: &str, remote: &str) {
  let header = Line::from(vec![
    Span::styled(" draftsync ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(
      format!(" {} ", key),
      Style::default().fg(Color::Yellow).bold(),
    ),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(
      format!(" {} ", remote_host(remote)),
      Style::default().fg(Color::White),
    ),
    Span::raw("  "),
    // Shortcuts - keys highlighted, descriptions dimmed
    Span::styled("<^S>", Style::default().fg(Color::Cyan)),
    Span::styled(" save", Style::default().fg(Color::DarkGray)),
    Span::raw("   "),
    Span::styled("<^R>", Style::default().fg(Color::Cyan)),
    Span::styled(" refresh", Style::default().fg(Color::DarkGray)),
    Span::raw("   "),
    Span::styled("<^D>", Style::default().fg(Color::Cyan)),
    Span::styled(" discard", Style::default().fg(Color::DarkGray)),
    Span::raw("   "),
    Span::styled("<Esc>", Style::default().fg(Color::Cyan)),
    Span::styled(" quit", Style::default().fg(Color::DarkGray)),
  ]);

  let paragraph = Paragraph::new(header).style(Style::default().bg(Color::Black));

  frame.render_widget(paragraph, area);
}

/// Host part of a remote URL; other labels pass through
fn remote_host(remote: &str) -> &str {
  match remote
    .strip_prefix("https://")
    .or_else(|| remote.strip_prefix("http://"))
  {
    Some(rest) => rest.split('/').next().unwrap_or(rest),
    None => remote,
  }
}
