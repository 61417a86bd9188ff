//! Display configuration options for lookout.
//!
//! Read from the `[display]` table of lookout.toml.

use crate::utils::{clamp_setting, parse_color};

use ratatui::style::Color;
use serde::Deserialize;

/// Display configuration options
#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct Display {
    syntax_theme: String,
    line_numbers: bool,
    preview_ratio: u16,
    accent: String,
    status_metadata: bool,
    render_markdown: bool,
    show_tree: bool,
}

impl Display {
    /// Name of a theme bundled with syntect, e.g. "base16-ocean.dark".
    pub fn syntax_theme(&self) -> &str {
        &self.syntax_theme
    }

    pub fn line_numbers(&self) -> bool {
        self.line_numbers
    }

    /// Percentage of the width given to the preview pane, clamped to 20..=80.
    pub fn preview_ratio(&self) -> u16 {
        clamp_setting("display.preview_ratio", self.preview_ratio, 20, 80)
    }

    pub fn accent(&self) -> Color {
        parse_color(&self.accent)
    }

    /// Show size, time and mode of the selected entry in the status line.
    pub fn status_metadata(&self) -> bool {
        self.status_metadata
    }

    /// Draw Markdown files as formatted documents instead of highlighted source.
    pub fn render_markdown(&self) -> bool {
        self.render_markdown
    }

    pub fn show_tree(&self) -> bool {
        self.show_tree
    }
}

impl Default for Display {
    fn default() -> Self {
        Display {
            syntax_theme: "base16-ocean.dark".into(),
            line_numbers: true,
            preview_ratio: 60,
            accent: "cyan".into(),
            status_metadata: true,
            render_markdown: true,
            show_tree: true,
        }
    }
}
