//! Syntax highlighting of text previews with syntect.

use crate::core::classify::SYNTAX_SET;
use crate::core::formatter::sanitize_line;

use once_cell::sync::Lazy;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Theme, ThemeSet};
use syntect::util::LinesWithEndings;

static THEME_SET: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

const FALLBACK_THEME: &str = "base16-ocean.dark";

/// Looks up a bundled theme, falling back to the default one.
pub fn theme(name: &str) -> Option<&'static Theme> {
    THEME_SET
        .themes
        .get(name)
        .or_else(|| {
            tracing::debug!(theme = name, "unknown syntax theme, using {FALLBACK_THEME}");
            THEME_SET.themes.get(FALLBACK_THEME)
        })
}

/// Names of the bundled themes, in the order the theme switch cycles through them.
pub fn theme_names() -> Vec<String> {
    THEME_SET.themes.keys().cloned().collect()
}

/// Syntax name for a code fence token such as `rs` or `python`.
pub fn language_for_token(token: &str) -> Option<String> {
    SYNTAX_SET
        .find_syntax_by_token(token)
        .map(|syntax| syntax.name.clone())
}

/// Highlights the first `max_lines` lines of `content`.
///
/// Lines are highlighted from the top so the parser state stays correct; callers skip the
/// scrolled-away lines afterwards. Unknown languages come back as plain lines.
pub fn highlight(
    content: &str,
    language: Option<&str>,
    theme: Option<&Theme>,
    max_lines: usize,
) -> Vec<Line<'static>> {
    let syntax = language.and_then(|name| SYNTAX_SET.find_syntax_by_name(name));
    let (Some(syntax), Some(theme)) = (syntax, theme) else {
        return plain(content, max_lines);
    };

    let mut highlighter = HighlightLines::new(syntax, theme);
    let mut out = Vec::with_capacity(max_lines.min(1024));
    for line in LinesWithEndings::from(content).take(max_lines) {
        let Ok(ranges) = highlighter.highlight_line(line, &SYNTAX_SET) else {
            // parser gave up; show the rest unstyled
            out.push(Line::from(sanitize_line(line)));
            continue;
        };
        let spans: Vec<Span<'static>> = ranges
            .into_iter()
            .map(|(style, text)| Span::styled(sanitize_line(text), to_ratatui(style)))
            .collect();
        out.push(Line::from(spans));
    }
    out
}

pub fn plain(content: &str, max_lines: usize) -> Vec<Line<'static>> {
    content
        .lines()
        .take(max_lines)
        .map(|l| Line::from(sanitize_line(l)))
        .collect()
}

fn to_ratatui(style: syntect::highlighting::Style) -> Style {
    let fg = style.foreground;
    let mut out = Style::default().fg(Color::Rgb(fg.r, fg.g, fg.b));
    if style.font_style.contains(FontStyle::BOLD) {
        out = out.add_modifier(Modifier::BOLD);
    }
    if style.font_style.contains(FontStyle::ITALIC) {
        out = out.add_modifier(Modifier::ITALIC);
    }
    if style.font_style.contains(FontStyle::UNDERLINE) {
        out = out.add_modifier(Modifier::UNDERLINED);
    }
    out
}
