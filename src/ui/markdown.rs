//! Markdown previews drawn as formatted documents.
//!
//! Headings, emphasis, lists, quotes and links are styled; fenced code blocks are
//! highlighted with the preview theme when their language is known.

use crate::core::formatter::sanitize_line;
use crate::ui::highlight;

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use syntect::highlighting::Theme;

/// Syntax name the classifier gives Markdown files.
pub const LANGUAGE: &str = "Markdown";

const RULE_WIDTH: usize = 40;

struct Writer {
    lines: Vec<Line<'static>>,
    current: Vec<Span<'static>>,
    styles: Vec<Style>,
    lists: Vec<Option<u64>>,
    quote_depth: usize,
    code: Option<(Option<String>, String)>,
    accent: Color,
}

impl Writer {
    fn new(accent: Color) -> Self {
        Self {
            lines: Vec::new(),
            current: Vec::new(),
            styles: vec![Style::default()],
            lists: Vec::new(),
            quote_depth: 0,
            code: None,
            accent,
        }
    }

    fn style(&self) -> Style {
        self.styles.last().copied().unwrap_or_default()
    }

    fn push_style(&mut self, f: impl FnOnce(Style) -> Style) {
        let next = f(self.style());
        self.styles.push(next);
    }

    fn pop_style(&mut self) {
        if self.styles.len() > 1 {
            self.styles.pop();
        }
    }

    fn push(&mut self, span: Span<'static>) {
        if self.current.is_empty() && self.quote_depth > 0 {
            self.current.push(Span::styled(
                "│ ".repeat(self.quote_depth),
                Style::default().fg(Color::DarkGray),
            ));
        }
        self.current.push(span);
    }

    fn text(&mut self, text: &str) {
        let style = self.style();
        for (i, part) in text.split('\n').enumerate() {
            if i > 0 {
                self.flush();
            }
            if !part.is_empty() {
                self.push(Span::styled(sanitize_line(part), style));
            }
        }
    }

    /// Ends the current line if it has content.
    fn flush(&mut self) {
        if !self.current.is_empty() {
            let spans = std::mem::take(&mut self.current);
            self.lines.push(Line::from(spans));
        }
    }

    /// Separates blocks with one empty line.
    fn blank(&mut self) {
        self.flush();
        if self.lines.last().is_some_and(|l| !l.spans.is_empty()) {
            self.lines.push(Line::default());
        }
    }

    fn code_block(&mut self, language: Option<String>, code: &str, theme: Option<&Theme>) {
        let language = language.and_then(|token| highlight::language_for_token(&token));
        let body = match language {
            Some(name) => highlight::highlight(code, Some(&name), theme, usize::MAX),
            None => highlight::plain(code, usize::MAX)
                .into_iter()
                .map(|line| line.style(Style::default().fg(Color::Yellow)))
                .collect(),
        };
        for line in body {
            self.push(Span::raw("    "));
            self.current.extend(line.spans);
            self.flush();
        }
        self.blank();
    }
}

/// Renders at most `max_lines` lines of `content`.
pub fn render(
    content: &str,
    theme: Option<&Theme>,
    accent: Color,
    max_lines: usize,
) -> Vec<Line<'static>> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut w = Writer::new(accent);
    for event in Parser::new_ext(content, options) {
        if w.lines.len() >= max_lines {
            break;
        }
        if let Some((_, buf)) = w.code.as_mut()
            && let Event::Text(text) = &event
        {
            buf.push_str(text);
            continue;
        }

        match event {
            Event::Start(tag) => match tag {
                Tag::Heading { level, .. } => {
                    w.blank();
                    let accent = w.accent;
                    w.push_style(|s| {
                        let s = s.fg(accent).add_modifier(Modifier::BOLD);
                        if level == HeadingLevel::H1 {
                            s.add_modifier(Modifier::UNDERLINED)
                        } else {
                            s
                        }
                    });
                }
                Tag::Paragraph => w.flush(),
                Tag::Strong => w.push_style(|s| s.add_modifier(Modifier::BOLD)),
                Tag::Emphasis => w.push_style(|s| s.add_modifier(Modifier::ITALIC)),
                Tag::Strikethrough => w.push_style(|s| s.add_modifier(Modifier::CROSSED_OUT)),
                Tag::Link { .. } | Tag::Image { .. } => {
                    w.push_style(|s| s.fg(Color::Cyan).add_modifier(Modifier::UNDERLINED))
                }
                Tag::BlockQuote(_) => {
                    w.flush();
                    w.quote_depth += 1;
                    w.push_style(|s| s.add_modifier(Modifier::ITALIC));
                }
                Tag::CodeBlock(kind) => {
                    w.flush();
                    let language = match kind {
                        CodeBlockKind::Fenced(info) => info
                            .split_whitespace()
                            .next()
                            .map(str::to_string),
                        CodeBlockKind::Indented => None,
                    };
                    w.code = Some((language, String::new()));
                }
                Tag::List(start) => {
                    w.flush();
                    w.lists.push(start);
                }
                Tag::Item => {
                    w.flush();
                    let depth = w.lists.len().saturating_sub(1);
                    let bullet = match w.lists.last_mut() {
                        Some(Some(n)) => {
                            let label = format!("{n}. ");
                            *n += 1;
                            label
                        }
                        _ => "• ".to_string(),
                    };
                    let accent = w.accent;
                    w.push(Span::styled(
                        format!("{}{}", "  ".repeat(depth), bullet),
                        Style::default().fg(accent),
                    ));
                }
                _ => {}
            },
            Event::End(tag) => match tag {
                TagEnd::Heading(_) => {
                    w.pop_style();
                    w.blank();
                }
                TagEnd::Paragraph => {
                    if w.lists.is_empty() {
                        w.blank();
                    } else {
                        w.flush();
                    }
                }
                TagEnd::Strong
                | TagEnd::Emphasis
                | TagEnd::Strikethrough
                | TagEnd::Link
                | TagEnd::Image => w.pop_style(),
                TagEnd::BlockQuote(_) => {
                    w.pop_style();
                    w.flush();
                    w.quote_depth = w.quote_depth.saturating_sub(1);
                    if w.quote_depth == 0 {
                        w.blank();
                    }
                }
                TagEnd::CodeBlock => {
                    if let Some((language, code)) = w.code.take() {
                        w.code_block(language, &code, theme);
                    }
                }
                TagEnd::List(_) => {
                    w.flush();
                    w.lists.pop();
                    if w.lists.is_empty() {
                        w.blank();
                    }
                }
                TagEnd::Item => w.flush(),
                _ => {}
            },
            Event::Text(text) => w.text(&text),
            Event::Code(code) => w.push(Span::styled(
                sanitize_line(&code),
                Style::default().fg(Color::Yellow),
            )),
            Event::SoftBreak => w.push(Span::raw(" ")),
            Event::HardBreak => w.flush(),
            Event::Rule => {
                w.blank();
                w.push(Span::styled(
                    "─".repeat(RULE_WIDTH),
                    Style::default().fg(Color::DarkGray),
                ));
                w.blank();
            }
            Event::TaskListMarker(done) => {
                w.push(Span::raw(if done { "[x] " } else { "[ ] " }))
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                let dim = Style::default().fg(Color::DarkGray);
                for part in html.lines() {
                    w.push(Span::styled(sanitize_line(part), dim));
                    w.flush();
                }
            }
            _ => {}
        }
    }

    w.flush();
    while w.lines.last().is_some_and(|l| l.spans.is_empty()) {
        w.lines.pop();
    }
    w.lines.truncate(max_lines);
    w.lines
}
