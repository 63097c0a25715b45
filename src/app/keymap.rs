use ftui::core::event::{KeyCode, KeyEvent, Modifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyAction {
    Up,
    Down,
    New,
    NewWithPrompt,
    Kill,
    Push,
    Checkout,
    Resume,
    Attach,
    ToggleTab,
    Quit,
    Help,
    ScrollUp,
    ScrollDown,
    PageUp,
    PageDown,
    GotoTop,
    GotoBottom,
    HalfPageUp,
    HalfPageDown,
    HunkPrev,
    HunkNext,
    FilePrev,
    FileNext,
    SelectIndex(usize),
}

pub(crate) fn is_ctrl_c(key_event: &KeyEvent) -> bool {
    key_event.modifiers == Modifiers::CTRL
        && matches!(key_event.code, KeyCode::Char('c') | KeyCode::Char('C'))
}

// The default-state keymap. States other than Default interpret keys
// themselves; actions returned here are ignored where meaningless.
pub(crate) fn global_action(key_event: &KeyEvent) -> Option<KeyAction> {
    if key_event.modifiers.contains(Modifiers::CTRL) {
        return match key_event.code {
            KeyCode::Char('c') | KeyCode::Char('C') => Some(KeyAction::Quit),
            KeyCode::Char('u') | KeyCode::Char('U') => Some(KeyAction::HalfPageUp),
            KeyCode::Char('d') | KeyCode::Char('D') => Some(KeyAction::HalfPageDown),
            _ => None,
        };
    }

    if key_event.modifiers.contains(Modifiers::SHIFT) {
        match key_event.code {
            KeyCode::Up => return Some(KeyAction::ScrollUp),
            KeyCode::Down => return Some(KeyAction::ScrollDown),
            _ => {}
        }
    }

    match key_event.code {
        KeyCode::Up | KeyCode::Char('k') => Some(KeyAction::Up),
        KeyCode::Down | KeyCode::Char('j') => Some(KeyAction::Down),
        KeyCode::Enter | KeyCode::Char('o') => Some(KeyAction::Attach),
        KeyCode::Tab => Some(KeyAction::ToggleTab),
        KeyCode::PageUp => Some(KeyAction::PageUp),
        KeyCode::PageDown => Some(KeyAction::PageDown),
        KeyCode::Home => Some(KeyAction::GotoTop),
        KeyCode::End => Some(KeyAction::GotoBottom),
        KeyCode::Char('n') => Some(KeyAction::New),
        KeyCode::Char('N') => Some(KeyAction::NewWithPrompt),
        KeyCode::Char('D') => Some(KeyAction::Kill),
        KeyCode::Char('p') => Some(KeyAction::Push),
        KeyCode::Char('c') => Some(KeyAction::Checkout),
        KeyCode::Char('r') => Some(KeyAction::Resume),
        KeyCode::Char('q') => Some(KeyAction::Quit),
        KeyCode::Char('?') => Some(KeyAction::Help),
        KeyCode::Char('g') => Some(KeyAction::GotoTop),
        KeyCode::Char('G') => Some(KeyAction::GotoBottom),
        KeyCode::Char('[') => Some(KeyAction::HunkPrev),
        KeyCode::Char(']') => Some(KeyAction::HunkNext),
        KeyCode::Char('{') => Some(KeyAction::FilePrev),
        KeyCode::Char('}') => Some(KeyAction::FileNext),
        KeyCode::Char('0') => Some(KeyAction::SelectIndex(9)),
        KeyCode::Char(digit @ '1'..='9') => {
            Some(KeyAction::SelectIndex(digit as usize - '1' as usize))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use ftui::core::event::{KeyCode, KeyEvent, Modifiers};

    use super::{KeyAction, global_action, is_ctrl_c};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code)
    }

    #[test]
    fn default_bindings_resolve() {
        assert_eq!(global_action(&key(KeyCode::Char('n'))), Some(KeyAction::New));
        assert_eq!(
            global_action(&key(KeyCode::Char('N'))),
            Some(KeyAction::NewWithPrompt)
        );
        assert_eq!(global_action(&key(KeyCode::Char('D'))), Some(KeyAction::Kill));
        assert_eq!(global_action(&key(KeyCode::Char('p'))), Some(KeyAction::Push));
        assert_eq!(
            global_action(&key(KeyCode::Char('c'))),
            Some(KeyAction::Checkout)
        );
        assert_eq!(
            global_action(&key(KeyCode::Char('r'))),
            Some(KeyAction::Resume)
        );
        assert_eq!(global_action(&key(KeyCode::Enter)), Some(KeyAction::Attach));
        assert_eq!(global_action(&key(KeyCode::Char('o'))), Some(KeyAction::Attach));
        assert_eq!(global_action(&key(KeyCode::Tab)), Some(KeyAction::ToggleTab));
        assert_eq!(global_action(&key(KeyCode::Char('q'))), Some(KeyAction::Quit));
        assert_eq!(global_action(&key(KeyCode::Char('?'))), Some(KeyAction::Help));
    }

    #[test]
    fn navigation_and_scroll_bindings_resolve() {
        assert_eq!(global_action(&key(KeyCode::Char('k'))), Some(KeyAction::Up));
        assert_eq!(global_action(&key(KeyCode::Char('j'))), Some(KeyAction::Down));
        assert_eq!(
            global_action(&KeyEvent::new(KeyCode::Up).with_modifiers(Modifiers::SHIFT)),
            Some(KeyAction::ScrollUp)
        );
        assert_eq!(
            global_action(&KeyEvent::new(KeyCode::Char('u')).with_modifiers(Modifiers::CTRL)),
            Some(KeyAction::HalfPageUp)
        );
        assert_eq!(global_action(&key(KeyCode::Char('['))), Some(KeyAction::HunkPrev));
        assert_eq!(global_action(&key(KeyCode::Char('}'))), Some(KeyAction::FileNext));
    }

    #[test]
    fn digits_select_by_index_with_zero_as_ten() {
        assert_eq!(
            global_action(&key(KeyCode::Char('1'))),
            Some(KeyAction::SelectIndex(0))
        );
        assert_eq!(
            global_action(&key(KeyCode::Char('9'))),
            Some(KeyAction::SelectIndex(8))
        );
        assert_eq!(
            global_action(&key(KeyCode::Char('0'))),
            Some(KeyAction::SelectIndex(9))
        );
    }

    #[test]
    fn ctrl_c_quits_from_default_state() {
        let event = KeyEvent::new(KeyCode::Char('c')).with_modifiers(Modifiers::CTRL);
        assert!(is_ctrl_c(&event));
        assert_eq!(global_action(&event), Some(KeyAction::Quit));
    }
}
