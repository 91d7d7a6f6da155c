use crate::app::{AppState, TestCase, TestStatus};
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;
use unicode_width::UnicodeWidthStr;

const ORDINAL_WIDTH: usize = 4;
const STEPS_WIDTH: usize = 7;
const STATUS_WIDTH: usize = 13;

pub fn status_color(status: TestStatus) -> Color {
    match status {
        TestStatus::Success => Color::Green,
        TestStatus::Failed => Color::Red,
        TestStatus::InProgress => Color::Yellow,
        TestStatus::Todo => Color::Blue,
        TestStatus::Unknown => Color::DarkGray,
    }
}

pub fn render(f: &mut Frame, area: Rect, state: &AppState) {
    let block = Block::default()
        .title(" Test Cases ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner_width = area.width.saturating_sub(2) as usize;

    if state.cases.is_empty() {
        let msg = if state.last_poll.is_some() {
            "No test cases to display."
        } else {
            "Loading test cases…"
        };
        let para = Paragraph::new(msg)
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(para, area);
        return;
    }

    let desc_width = inner_width.saturating_sub(2 + ORDINAL_WIDTH + STEPS_WIDTH + STATUS_WIDTH);

    let mut lines = vec![Line::from(Span::styled(
        format!(
            "  {:<ow$}{:<dw$}{:>sw$} {:<stw$}",
            "#",
            "Description",
            "Steps",
            "Status",
            ow = ORDINAL_WIDTH,
            dw = desc_width,
            sw = STEPS_WIDTH - 1,
            stw = STATUS_WIDTH - 1,
        ),
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD),
    ))];

    // Keep the cursor row visible (minus borders and the header row).
    let visible_height = area.height.saturating_sub(3) as usize;
    let scroll_offset = if visible_height > 0 && state.cursor >= visible_height {
        state.cursor - visible_height + 1
    } else {
        0
    };

    for (idx, case) in state
        .cases
        .iter()
        .enumerate()
        .skip(scroll_offset)
        .take(visible_height.max(1))
    {
        let is_cursor = idx == state.cursor;
        let is_selected = state.selection() == Some(case.id);
        lines.push(render_case_line(case, idx + 1, is_cursor, is_selected, desc_width));
    }

    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_case_line(
    case: &TestCase,
    ordinal: usize,
    is_cursor: bool,
    is_selected: bool,
    desc_width: usize,
) -> Line<'_> {
    let base = if is_cursor {
        Style::default().bg(Color::DarkGray)
    } else {
        Style::default()
    };
    let marker = if is_selected { "▶ " } else { "  " };
    let description = pad(&truncate(&case.description, desc_width), desc_width);

    Line::from(vec![
        Span::styled(marker, base.fg(Color::Cyan)),
        Span::styled(format!("{:<w$}", ordinal, w = ORDINAL_WIDTH), base.fg(Color::DarkGray)),
        Span::styled(
            description,
            if is_selected {
                base.add_modifier(Modifier::BOLD)
            } else {
                base
            },
        ),
        Span::styled(format!("{:>w$} ", case.step_count, w = STEPS_WIDTH - 1), base),
        Span::styled(
            format!("{:<w$}", case.status.label(), w = STATUS_WIDTH - 1),
            base.fg(status_color(case.status)),
        ),
    ])
}

pub fn truncate(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    if max_width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut width = 0;
    for ch in s.chars() {
        let w = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + w + 1 > max_width {
            break;
        }
        out.push(ch);
        width += w;
    }
    out.push('…');
    out
}

fn pad(s: &str, width: usize) -> String {
    let used = UnicodeWidthStr::width(s);
    format!("{s}{}", " ".repeat(width.saturating_sub(used)))
}
