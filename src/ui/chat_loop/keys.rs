use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// What a key press means to the chat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    Submit,
    /// Enter while a permission prompt is showing.
    Answer,
    Deny,
    Abort,
    HistoryPrev,
    HistoryNext,
    ScrollUp,
    ScrollDown,
    /// Forward to the text area.
    Edit,
}

pub fn map_key(key: &KeyEvent, permission_pending: bool) -> KeyAction {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('c') | KeyCode::Char('d') if ctrl => KeyAction::Quit,
        KeyCode::Enter if key.modifiers.intersects(KeyModifiers::SHIFT | KeyModifiers::ALT) => {
            KeyAction::Edit
        }
        KeyCode::Enter if permission_pending => KeyAction::Answer,
        KeyCode::Enter => KeyAction::Submit,
        KeyCode::Esc if permission_pending => KeyAction::Deny,
        KeyCode::Esc => KeyAction::Abort,
        KeyCode::Up if !permission_pending => KeyAction::HistoryPrev,
        KeyCode::Down if !permission_pending => KeyAction::HistoryNext,
        KeyCode::PageUp => KeyAction::ScrollUp,
        KeyCode::PageDown => KeyAction::ScrollDown,
        _ => KeyAction::Edit,
    }
}
