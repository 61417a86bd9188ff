//! Key mapping and action dispatch for lookout
//!
//! Maps keys from the `[keys]` config section to actions, grouped into navigation,
//! preview and system actions.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::HashMap;

/// Any action in the app.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Action {
    Nav(NavAction),
    Preview(PreviewAction),
    View(ViewAction),
    System(SystemAction),
}

/// Tree and history movement.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum NavAction {
    Open,
    GoUp,
    GoDown,
    GoParent,
    GoBack,
    GoToTop,
    GoToBottom,
    ToggleExpand,
    Refresh,
    ToggleHidden,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PreviewAction {
    ScrollUp,
    ScrollDown,
}

/// Runtime display switches.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ViewAction {
    ToggleLineNumbers,
    CycleTheme,
    ToggleTree,
    ToggleMarkdown,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SystemAction {
    CopyPath,
    Quit,
}

/// Key + modifiers as used in keybind/keymap
#[derive(Hash, Eq, PartialEq, Copy, Clone, Debug)]
pub struct Key {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

/// Mapping from Key to action, built from the config
pub struct Keymap {
    map: HashMap<Key, Action>,
}

impl Keymap {
    #[rustfmt::skip]
    pub fn from_config(config: &crate::config::Config) -> Self {
        let mut map = HashMap::new();
        let keys = config.keys();

        macro_rules! bind {
            ($keys:expr, $action:expr) => {
                bind($keys, $action, &mut map);
            };
        }

        use NavAction as N;
        use PreviewAction as P;
        use SystemAction as S;
        use ViewAction as V;

        bind!(keys.open(),                Action::Nav(N::Open));
        bind!(keys.go_up(),               Action::Nav(N::GoUp));
        bind!(keys.go_down(),             Action::Nav(N::GoDown));
        bind!(keys.go_parent(),           Action::Nav(N::GoParent));
        bind!(keys.go_back(),             Action::Nav(N::GoBack));
        bind!(keys.go_to_top(),           Action::Nav(N::GoToTop));
        bind!(keys.go_to_bottom(),        Action::Nav(N::GoToBottom));
        bind!(keys.toggle_expand(),       Action::Nav(N::ToggleExpand));
        bind!(keys.refresh(),             Action::Nav(N::Refresh));
        bind!(keys.toggle_hidden(),       Action::Nav(N::ToggleHidden));

        bind!(keys.scroll_preview_up(),   Action::Preview(P::ScrollUp));
        bind!(keys.scroll_preview_down(), Action::Preview(P::ScrollDown));

        bind!(keys.toggle_line_numbers(), Action::View(V::ToggleLineNumbers));
        bind!(keys.cycle_theme(),         Action::View(V::CycleTheme));
        bind!(keys.toggle_tree(),         Action::View(V::ToggleTree));
        bind!(keys.toggle_markdown(),     Action::View(V::ToggleMarkdown));

        bind!(keys.copy_path(),           Action::System(S::CopyPath));
        bind!(keys.quit(),                Action::System(S::Quit));

        Keymap { map }
    }

    /// Looks up the action for a key event.
    ///
    /// Shifted characters also match a binding without the shift modifier, so "G" matches
    /// both `G` and `shift+g` as terminals report them.
    pub fn lookup(&self, key: KeyEvent) -> Option<Action> {
        let k = Key {
            code: key.code,
            modifiers: key.modifiers,
        };

        if let Some(action) = self.map.get(&k).copied() {
            return Some(action);
        }

        if matches!(key.code, KeyCode::Char(_)) && key.modifiers.contains(KeyModifiers::SHIFT) {
            let k2 = Key {
                code: key.code,
                modifiers: key.modifiers - KeyModifiers::SHIFT,
            };
            return self.map.get(&k2).copied();
        }
        None
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

pub fn parse_key(s: &str) -> Option<Key> {
    let mut modifiers = KeyModifiers::NONE;
    let mut code: Option<KeyCode> = None;

    // single punctuation keys ("-", "+", ".") bind literally
    if s.chars().count() == 1 {
        let c = s.chars().next()?;
        return Some(Key {
            code: KeyCode::Char(c),
            modifiers,
        });
    }

    let is_bracketed = s.starts_with('<') && s.ends_with('>');
    let mut input = s.trim_start_matches('<').trim_end_matches('>').to_string();

    if is_bracketed && input.contains('-') {
        let parts: Vec<&str> = input.split('-').collect();

        for &prefix in parts.iter().take(parts.len().saturating_sub(1)) {
            match prefix.to_lowercase().as_str() {
                "c" | "ctrl" => modifiers |= KeyModifiers::CONTROL,
                "a" | "m" | "alt" => modifiers |= KeyModifiers::ALT,
                "s" | "shift" => modifiers |= KeyModifiers::SHIFT,
                _ => return None,
            }
        }
        input = parts.last()?.to_string();
    }

    let normalized = input.replace('-', "+");
    for part in normalized.split('+') {
        let p_low = part.to_lowercase();
        match p_low.as_str() {
            "ctrl" | "control" => modifiers |= KeyModifiers::CONTROL,
            "alt" | "meta" => modifiers |= KeyModifiers::ALT,
            "shift" => modifiers |= KeyModifiers::SHIFT,

            "up" => code = Some(KeyCode::Up),
            "down" => code = Some(KeyCode::Down),
            "left" => code = Some(KeyCode::Left),
            "right" => code = Some(KeyCode::Right),
            "enter" => code = Some(KeyCode::Enter),
            "esc" => code = Some(KeyCode::Esc),
            "backspace" | "back" => code = Some(KeyCode::Backspace),
            "tab" => code = Some(KeyCode::Tab),
            "space" | "spc" => code = Some(KeyCode::Char(' ')),
            "pageup" | "pgup" => code = Some(KeyCode::PageUp),
            "pagedown" | "pgdn" => code = Some(KeyCode::PageDown),
            "home" => code = Some(KeyCode::Home),
            "end" => code = Some(KeyCode::End),

            _ => {
                if part.chars().count() == 1 {
                    let mut c = part.chars().next()?;
                    if modifiers.contains(KeyModifiers::SHIFT) {
                        c = c.to_ascii_uppercase();
                    }
                    code = Some(KeyCode::Char(c));
                } else if p_low.starts_with('f')
                    && p_low.len() > 1
                    && p_low[1..].chars().all(|c| c.is_ascii_digit())
                {
                    let n = p_low[1..].parse().ok()?;
                    code = Some(KeyCode::F(n));
                } else if part.is_empty() {
                    continue;
                } else {
                    return None;
                }
            }
        }
    }

    Some(Key {
        code: code?,
        modifiers,
    })
}

fn bind(key_list: &[String], action: Action, map: &mut HashMap<Key, Action>) {
    for k in key_list {
        match parse_key(k) {
            Some(key) => {
                map.insert(key, action);
            }
            None => tracing::warn!(key = %k, ?action, "ignoring unparseable key binding"),
        }
    }
}
