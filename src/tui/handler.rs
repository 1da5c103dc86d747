use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    Quit,
    MoveUp,
    MoveDown,
    MoveToTop,
    MoveToBottom,
    Refresh,
    OpenInBrowser,
    ToggleAutoRefresh,
    ShowHelp,
    HideHelp,
    // Command input actions
    CommandStart,
    CommandChar(char),
    CommandBackspace,
    CommandConfirm,
    CommandCancel,
}

pub fn handle_key_event(
    key: KeyEvent,
    command_input_active: bool,
    show_help: bool,
) -> Option<AppAction> {
    // If help is showing, any key closes it
    if show_help {
        return Some(AppAction::HideHelp);
    }

    if command_input_active {
        return match key.code {
            KeyCode::Enter => Some(AppAction::CommandConfirm),
            KeyCode::Esc => Some(AppAction::CommandCancel),
            KeyCode::Backspace => Some(AppAction::CommandBackspace),
            KeyCode::Char(c) => Some(AppAction::CommandChar(c)),
            _ => None,
        };
    }

    // Normal mode
    match (key.code, key.modifiers) {
        (KeyCode::Char('q'), _) => Some(AppAction::Quit),
        (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(AppAction::Quit),

        (KeyCode::Char('j'), _) | (KeyCode::Down, _) => Some(AppAction::MoveDown),
        (KeyCode::Char('k'), _) | (KeyCode::Up, _) => Some(AppAction::MoveUp),
        (KeyCode::Home, _) => Some(AppAction::MoveToTop),
        (KeyCode::End, _) => Some(AppAction::MoveToBottom),

        // plain and Ctrl variants share a binding
        (KeyCode::Char('r'), _) => Some(AppAction::Refresh),
        (KeyCode::Char('o'), _) => Some(AppAction::OpenInBrowser),
        (KeyCode::Char('t'), _) => Some(AppAction::ToggleAutoRefresh),
        (KeyCode::Char(':'), _) => Some(AppAction::CommandStart),

        (KeyCode::Char('?'), _) => Some(AppAction::ShowHelp),

        _ => None,
    }
}
