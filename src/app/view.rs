//! Display switches that can change while the app runs.
//!
//! Seeded from `[display]`; key presses flip them without touching the config.

use crate::config::Display;

pub struct ViewState {
    line_numbers: bool,
    show_tree: bool,
    render_markdown: bool,
    themes: Vec<String>,
    theme: usize,
}

impl ViewState {
    /// `themes` is the cycle order. The configured theme joins it if missing.
    pub fn new(display: &Display, mut themes: Vec<String>) -> Self {
        let configured = display.syntax_theme();
        let theme = match themes.iter().position(|t| t == configured) {
            Some(idx) => idx,
            None => {
                themes.insert(0, configured.to_string());
                0
            }
        };
        Self {
            line_numbers: display.line_numbers(),
            show_tree: display.show_tree(),
            render_markdown: display.render_markdown(),
            themes,
            theme,
        }
    }

    // Accessors

    #[inline]
    pub fn line_numbers(&self) -> bool {
        self.line_numbers
    }

    #[inline]
    pub fn show_tree(&self) -> bool {
        self.show_tree
    }

    #[inline]
    pub fn render_markdown(&self) -> bool {
        self.render_markdown
    }

    pub fn theme_name(&self) -> &str {
        self.themes.get(self.theme).map_or("", String::as_str)
    }

    pub fn toggle_line_numbers(&mut self) {
        self.line_numbers = !self.line_numbers;
    }

    pub fn toggle_tree(&mut self) {
        self.show_tree = !self.show_tree;
    }

    pub fn toggle_markdown(&mut self) {
        self.render_markdown = !self.render_markdown;
    }

    /// Moves to the next theme, wrapping around. Returns its name.
    pub fn cycle_theme(&mut self) -> &str {
        if !self.themes.is_empty() {
            self.theme = (self.theme + 1) % self.themes.len();
        }
        self.theme_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn themes() -> Vec<String> {
        ["InspiredGitHub", "base16-ocean.dark", "Solarized (dark)"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn starts_from_the_configured_display() {
        let view = ViewState::new(&Display::default(), themes());
        assert!(view.line_numbers());
        assert!(view.show_tree());
        assert!(view.render_markdown());
        assert_eq!(view.theme_name(), "base16-ocean.dark");
    }

    #[test]
    fn switches_flip_back_and_forth() {
        let mut view = ViewState::new(&Display::default(), themes());
        view.toggle_line_numbers();
        view.toggle_tree();
        view.toggle_markdown();
        assert!(!view.line_numbers());
        assert!(!view.show_tree());
        assert!(!view.render_markdown());
        view.toggle_tree();
        assert!(view.show_tree());
    }

    #[test]
    fn themes_cycle_and_wrap() {
        let mut view = ViewState::new(&Display::default(), themes());
        assert_eq!(view.cycle_theme(), "Solarized (dark)");
        assert_eq!(view.cycle_theme(), "InspiredGitHub");
        assert_eq!(view.cycle_theme(), "base16-ocean.dark");
    }

    #[test]
    fn unknown_configured_theme_joins_the_cycle() {
        let mut view = ViewState::new(&Display::default(), Vec::new());
        assert_eq!(view.theme_name(), "base16-ocean.dark");
        assert_eq!(view.cycle_theme(), "base16-ocean.dark");
    }
}
