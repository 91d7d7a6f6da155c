use crate::app::{AppState, CaseView, CurrentView, LogEntry, LogKind, COLLAPSED_LOG_LINES};
use crate::tui::spinner;
use chrono::Local;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

pub fn render(f: &mut Frame, area: Rect, state: &AppState) {
    match state.current_view() {
        CurrentView::NoSelection => render_message(
            f,
            area,
            "Select Test Case to see details",
            Color::DarkGray,
        ),
        CurrentView::Unavailable { case_id } => render_message(
            f,
            area,
            &format!("Test case {case_id} is no longer available. Select another test case."),
            Color::Red,
        ),
        CurrentView::Selected(view) => render_case(f, area, state, &view),
    }
}

fn render_message(f: &mut Frame, area: Rect, msg: &str, color: Color) {
    let para = Paragraph::new(msg.to_owned())
        .style(Style::default().fg(color).add_modifier(Modifier::BOLD))
        .centered()
        .block(Block::default().borders(Borders::NONE))
        .wrap(Wrap { trim: true });
    f.render_widget(para, area);
}

fn render_case(f: &mut Frame, area: Rect, state: &AppState, view: &CaseView<'_>) {
    let mut title = format!(" Test Result of #{} ", view.ordinal);
    if view.loading {
        title.push_str(&format!("{} ", spinner::frame(state.spinner_frame)));
    }

    let mut lines = vec![
        Line::from(Span::styled(
            "Test description",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(view.case.description.as_str()),
        action_line(state, view),
        Line::raw(""),
    ];

    // Borders, the header lines above, and one spare row.
    let budget = (area.height as usize).saturating_sub(2 + lines.len());
    let limit = if state.logs_expanded {
        budget
    } else {
        budget.min(COLLAPSED_LOG_LINES)
    };

    if view.logs.is_empty() {
        lines.push(Line::from(Span::styled(
            "No logs available for this test case.",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD),
        )));
    } else {
        let hidden = view.logs.len().saturating_sub(limit);
        if hidden > 0 {
            let toggle = if state.logs_expanded {
                "show less"
            } else {
                "show full"
            };
            lines.push(Line::from(Span::styled(
                format!("… {hidden} earlier lines (x to {toggle})"),
                Style::default().fg(Color::DarkGray),
            )));
        }
        let shown = limit.saturating_sub(usize::from(hidden > 0));
        let start = view.logs.len().saturating_sub(shown);
        lines.extend(view.logs[start..].iter().map(|entry| log_line(entry)));
    }

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    f.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
        area,
    );
}

/// Actions offered for the case, gated the same way the keys are.
fn action_line<'a>(state: &AppState, view: &CaseView<'a>) -> Line<'a> {
    let key = Style::default().fg(Color::Cyan);
    let desc = Style::default().fg(Color::DarkGray);
    let mut spans = Vec::new();

    if !view.in_progress {
        spans.push(Span::styled("s", key));
        spans.push(Span::styled(
            if view.has_result { " restart  " } else { " start  " },
            desc,
        ));
    }
    if view.has_result {
        match state.download {
            Some(progress) if progress.case_id == view.case.id => {
                spans.push(Span::styled(
                    format!("downloading… check {}", progress.attempt),
                    Style::default().fg(Color::Yellow),
                ));
                spans.push(Span::styled("  c", key));
                spans.push(Span::styled(" cancel", desc));
            }
            _ => {
                spans.push(Span::styled("d", key));
                spans.push(Span::styled(" download result as CSV", desc));
            }
        }
    }
    if view.in_progress {
        spans.push(Span::styled("running…", Style::default().fg(Color::Yellow)));
    }
    Line::from(spans)
}

pub fn format_log(entry: &LogEntry) -> String {
    format!(
        "[{}] {}",
        entry.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
        entry.message
    )
}

fn log_line(entry: &LogEntry) -> Line<'static> {
    let style = match entry.kind {
        LogKind::Error => Style::default().fg(Color::Red),
        LogKind::Info => Style::default().fg(Color::Gray),
    };
    Line::from(Span::styled(format_log(entry), style))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn log_line_contains_message_and_timestamp() {
        let entry = LogEntry {
            message: "Clicking upload".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
            kind: LogKind::Info,
        };
        let text = format_log(&entry);
        assert!(text.starts_with('['));
        assert!(text.ends_with("] Clicking upload"));
    }
}
