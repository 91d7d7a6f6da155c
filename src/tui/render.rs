use crate::app::AppState;
use crate::tui::{detail, footer, header, table};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

/// Rows the case table wants: borders, header row, one per case.
fn table_height(state: &AppState, body: u16) -> u16 {
    let wanted = (state.cases.len() as u16).saturating_add(3).max(4);
    let cap = if state.logs_expanded { body / 4 } else { body / 5 * 2 };
    wanted.min(cap.max(4))
}

pub fn render(f: &mut Frame, state: &AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2), // header
            Constraint::Min(1),    // body
            Constraint::Length(2), // footer
        ])
        .split(f.area());

    let body = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(table_height(state, chunks[1].height)),
            Constraint::Min(1),
        ])
        .split(chunks[1]);

    header::render(f, chunks[0], state);
    table::render(f, body[0], state);
    detail::render(f, body[1], state);
    footer::render(f, chunks[2], state);

    if let Some(err) = state.error_message() {
        let area = f.area();
        if area.height > 6 && area.width >= 4 {
            let err_area = Rect {
                x: area.x + 1,
                y: area.y + area.height.saturating_sub(5),
                width: area.width.saturating_sub(2),
                height: 3,
            };
            let err_widget = Paragraph::new(err.to_owned())
                .style(Style::default().fg(Color::Red))
                .block(
                    Block::default()
                        .title(" Error ")
                        .borders(Borders::ALL)
                        .border_style(Style::default().fg(Color::Red)),
                )
                .wrap(Wrap { trim: true });
            f.render_widget(ratatui::widgets::Clear, err_area);
            f.render_widget(err_widget, err_area);
        }
    }
}
