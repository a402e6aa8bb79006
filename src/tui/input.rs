//! Keyboard handling for the routine picker.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use super::RoutinePicker;

/// Outcome of a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerAction {
    Continue,
    Select(String),
    Cancel,
}

/// Apply `key` to `picker`.
pub fn handle_key(key: KeyEvent, picker: &mut RoutinePicker) -> PickerAction {
    if key.kind != KeyEventKind::Press {
        return PickerAction::Continue;
    }

    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Esc => PickerAction::Cancel,
        KeyCode::Char('c' | 'd') if ctrl => PickerAction::Cancel,
        KeyCode::Enter => {
            picker.selected().map_or(PickerAction::Continue, |name| PickerAction::Select(name.to_string()))
        }
        KeyCode::Up => {
            picker.select_previous();
            PickerAction::Continue
        }
        KeyCode::Char('p' | 'k') if ctrl => {
            picker.select_previous();
            PickerAction::Continue
        }
        KeyCode::Down | KeyCode::Tab => {
            picker.select_next();
            PickerAction::Continue
        }
        KeyCode::Char('n' | 'j') if ctrl => {
            picker.select_next();
            PickerAction::Continue
        }
        KeyCode::Char('u') if ctrl => {
            picker.clear_query();
            PickerAction::Continue
        }
        KeyCode::Backspace => {
            picker.pop_char();
            PickerAction::Continue
        }
        KeyCode::Char(c) if !ctrl => {
            picker.push_char(c);
            PickerAction::Continue
        }
        _ => PickerAction::Continue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::RoutineMap;

    fn picker() -> RoutinePicker {
        let routines: RoutineMap = [("build", "cargo build"), ("test", "cargo test")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RoutinePicker::new(&routines)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_typing_and_selecting() {
        let mut picker = picker();
        assert_eq!(handle_key(key(KeyCode::Char('t')), &mut picker), PickerAction::Continue);
        assert_eq!(picker.query(), "t");
        assert_eq!(handle_key(key(KeyCode::Enter), &mut picker), PickerAction::Select("test".into()));
    }

    #[test]
    fn test_navigation() {
        let mut picker = picker();
        handle_key(key(KeyCode::Down), &mut picker);
        assert_eq!(picker.selected(), Some("test"));
        handle_key(KeyEvent::new(KeyCode::Char('p'), KeyModifiers::CONTROL), &mut picker);
        assert_eq!(picker.selected(), Some("build"));
    }

    #[test]
    fn test_cancel() {
        let mut picker = picker();
        assert_eq!(handle_key(key(KeyCode::Esc), &mut picker), PickerAction::Cancel);
        assert_eq!(
            handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL), &mut picker),
            PickerAction::Cancel
        );
    }

    #[test]
    fn test_enter_without_match_continues() {
        let mut picker = picker();
        handle_key(key(KeyCode::Char('z')), &mut picker);
        assert_eq!(handle_key(key(KeyCode::Enter), &mut picker), PickerAction::Continue);
    }
}
