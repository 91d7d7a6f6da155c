use crate::app::AppState;
use crate::tui::spinner;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

pub fn render(f: &mut Frame, area: Rect, state: &AppState) {
    let mut spans = vec![
        Span::styled(
            format!(" {} ", state.config.version_string),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw("│ "),
        Span::styled(
            state.config.base_url.as_str(),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
    ];

    if state.has_in_progress() {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(
            format!("{} running", spinner::frame(state.spinner_frame)),
            Style::default().fg(Color::Yellow),
        ));
    }

    // Age of the case list; grows while polls are failing silently.
    let freshness = match state.last_poll {
        Some(at) => format!(" updated {}s ago", at.elapsed().as_secs()),
        None => " connecting…".to_string(),
    };
    spans.push(Span::styled(freshness, Style::default().fg(Color::DarkGray)));

    if state.error_message().is_some() {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(
            "!",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(header, area);
}
