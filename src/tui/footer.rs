use crate::app::AppState;
use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

pub fn render(f: &mut Frame, area: Rect, state: &AppState) {
    let narrow = area.width < crate::app::NARROW_WIDTH_THRESHOLD;
    let selected = state.selection().is_some();

    let hints: &[(&str, &str)] = match (narrow, selected) {
        (true, _) => &[("j/k", "nav"), ("⏎", "select"), ("s", "start"), ("q", "quit")],
        (false, false) => &[
            ("↑↓/jk", "navigate"),
            ("⏎/space", "select"),
            ("1-9", "jump"),
            ("R", "reset all"),
            ("q", "quit"),
        ],
        (false, true) => &[
            ("↑↓/jk", "navigate"),
            ("⏎/space", "select"),
            ("s", "start"),
            ("d", "download"),
            ("x", "logs"),
            ("R", "reset all"),
            ("esc", "deselect"),
            ("q", "quit"),
        ],
    };

    let line = if let Some(notif) = state.notifications.last() {
        Line::from(vec![
            Span::styled("★ ", Style::default().fg(Color::Yellow)),
            Span::styled(notif.message.as_str(), Style::default().fg(Color::Yellow)),
        ])
    } else if let Some(progress) = state.download {
        let limit = if progress.max_attempts == 0 {
            String::new()
        } else {
            format!("/{}", progress.max_attempts)
        };
        Line::from(Span::styled(
            format!(
                "Waiting for report of case {} (check {}{limit}) · c to cancel",
                progress.case_id, progress.attempt
            ),
            Style::default().fg(Color::Yellow),
        ))
    } else {
        let mut spans: Vec<Span> = Vec::new();
        for (i, (key, desc)) in hints.iter().enumerate() {
            if i > 0 {
                spans.push(Span::raw(" "));
            }
            spans.push(Span::styled(*key, Style::default().fg(Color::Cyan)));
            spans.push(Span::styled(format!(" {desc}"), Style::default().fg(Color::DarkGray)));
        }
        Line::from(spans)
    };

    let footer = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::TOP)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(footer, area);
}
