//! Copying text to the system clipboard.
//!
//! Text goes out as an OSC 52 escape sequence, which most terminals (and ssh sessions)
//! forward, and through arboard for X11/Wayland terminals that ignore OSC 52. The last
//! copied text is always kept internally.

use crossterm::clipboard::CopyToClipboard;
use crossterm::execute;

use std::io::{Write, stdout};
use std::sync::Mutex;

/// On X11 the clipboard owner must stay alive to answer paste requests.
static SYSTEM_CLIPBOARD: Mutex<Option<arboard::Clipboard>> = Mutex::new(None);

#[derive(Debug, Clone, Default)]
pub struct Clipboard {
    internal: String,
    internal_only: bool,
}

impl Clipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps copies internal. Used by tests so they never write to the terminal.
    pub fn set_internal_only(&mut self, enabled: bool) {
        self.internal_only = enabled;
    }

    #[inline]
    pub fn last_copied(&self) -> Option<&str> {
        (!self.internal.is_empty()).then_some(self.internal.as_str())
    }

    pub fn copy(&mut self, text: &str) {
        self.internal = text.to_string();
        if self.internal_only {
            return;
        }

        if let Err(e) = execute!(stdout(), CopyToClipboard::to_clipboard_from(text)) {
            tracing::debug!(error = %e, "OSC 52 copy failed");
        }
        let _ = stdout().flush();

        let mut guard = SYSTEM_CLIPBOARD.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            match arboard::Clipboard::new() {
                Ok(cb) => *guard = Some(cb),
                Err(e) => {
                    tracing::debug!(error = %e, "system clipboard unavailable");
                    return;
                }
            }
        }
        if let Some(cb) = guard.as_mut()
            && let Err(e) = cb.set_text(text)
        {
            tracing::debug!(error = %e, "system clipboard copy failed");
            *guard = None;
        }
    }
}
