use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    DismissError,
    MoveUp,
    MoveDown,
    /// Select the case under the cursor, or deselect it if already selected.
    ToggleSelect,
    ClearSelection,
    QuickSelect(usize),
    StartRun,
    ResetAll,
    Download,
    CancelDownload,
    ToggleLogs,
    None,
}

/// Captures the UI state needed to interpret a key press.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputContext {
    pub has_error: bool,
    pub has_selection: bool,
    pub downloading: bool,
}

pub fn map_key(key: KeyEvent, ctx: &InputContext) -> Action {
    if key.kind != KeyEventKind::Press {
        return Action::None;
    }

    // Ctrl+C always quits
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Action::Quit;
    }

    match key.code {
        KeyCode::Char('q') => Action::Quit,
        KeyCode::Esc => {
            if ctx.has_error {
                Action::DismissError
            } else if ctx.has_selection {
                Action::ClearSelection
            } else {
                Action::Quit
            }
        }
        KeyCode::Up | KeyCode::Char('k') => Action::MoveUp,
        KeyCode::Down | KeyCode::Char('j') => Action::MoveDown,
        KeyCode::Enter | KeyCode::Char(' ') => Action::ToggleSelect,
        KeyCode::Char('s') => Action::StartRun,
        KeyCode::Char('R') => Action::ResetAll,
        KeyCode::Char('d') => Action::Download,
        KeyCode::Char('c') if ctx.downloading => Action::CancelDownload,
        KeyCode::Char('x') => Action::ToggleLogs,
        KeyCode::Char(c) if c.is_ascii_digit() && c != '0' => {
            Action::QuickSelect((c as u8 - b'0') as usize)
        }
        _ => Action::None,
    }
}
