use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    /// A printable key; letters compare case-insensitively.
    Char(char),
    Delete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShortcutEvent {
    pub key: Key,
    pub ctrl_or_cmd: bool,
    pub shift: bool,
    // focus is inside an editable text field
    pub in_text_field: bool,
    pub at: Instant,
}

impl ShortcutEvent {
    pub fn new(key: Key, at: Instant) -> Self {
        Self { key, ctrl_or_cmd: false, shift: false, in_text_field: false, at }
    }

    pub fn ctrl(c: char, at: Instant) -> Self {
        Self { ctrl_or_cmd: true, ..Self::new(Key::Char(c), at) }
    }

    pub fn with_shift(self) -> Self { Self { shift: true, ..self } }
    pub fn in_text_field(self) -> Self { Self { in_text_field: true, ..self } }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShortcutAction {
    Undo,
    Redo,
    SelectAll,
    CopySelection,
    CopyAll,
    Paste,
    DeleteSelection,
    None,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShortcutOutcome {
    pub action: ShortcutAction,
    pub acted: bool,
    // document text to place on the system clipboard after a copy
    pub clipboard: Option<String>,
}

/// Maps key presses to editor actions. Tracks the previous Ctrl/Cmd+C so a
/// quick second press copies the whole graph, even from inside a text field.
#[derive(Clone, Debug)]
pub struct ShortcutResolver {
    copy_all_window: Duration,
    last_copy_at: Option<Instant>,
}

impl ShortcutResolver {
    pub fn new(copy_all_window: Duration) -> Self {
        Self { copy_all_window, last_copy_at: None }
    }

    pub fn resolve(&mut self, ev: &ShortcutEvent) -> ShortcutAction {
        let letter = match ev.key {
            Key::Char(c) => Some(c.to_ascii_lowercase()),
            _ => None,
        };

        if ev.ctrl_or_cmd && letter == Some('c') {
            let double = self
                .last_copy_at
                .is_some_and(|t| ev.at.saturating_duration_since(t) <= self.copy_all_window);
            if double {
                self.last_copy_at = None;
                return ShortcutAction::CopyAll;
            }
            self.last_copy_at = Some(ev.at);
            if ev.in_text_field {
                return ShortcutAction::None;
            }
            return ShortcutAction::CopySelection;
        }

        if ev.in_text_field {
            return ShortcutAction::None;
        }
        match (ev.ctrl_or_cmd, letter, ev.key) {
            (true, Some('z'), _) if ev.shift => ShortcutAction::Redo,
            (true, Some('z'), _) => ShortcutAction::Undo,
            (true, Some('y'), _) => ShortcutAction::Redo,
            (true, Some('a'), _) => ShortcutAction::SelectAll,
            (true, Some('v'), _) => ShortcutAction::Paste,
            (false, _, Key::Delete) => ShortcutAction::DeleteSelection,
            _ => ShortcutAction::None,
        }
    }
}
