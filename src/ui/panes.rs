//! Tree and preview panes.
//!
//! The preview draws each [RenderResult] kind its own way: highlighted text, half-block
//! images, tables, directory listings, binary summaries and error banners.

use crate::app::AppState;
use crate::core::backend::DirectoryListing;
use crate::core::formatter::{
    display_name, error_banner, format_file_size, sanitize_line, sanitize_to_exact_width,
};
use crate::core::render::RenderResult;
use crate::ui::{highlight, markdown};

use ratatui::{
    Frame,
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, List, ListItem, ListState, Paragraph, Row, Table, Wrap},
};
use unicode_width::UnicodeWidthStr;

const MAX_COLUMN_WIDTH: usize = 32;

/// Draws the tree of the current directory with expanded children indented.
pub fn draw_tree(frame: &mut Frame, app: &AppState, area: Rect, block: Block) {
    let nav = app.nav();
    let inner_width = block.inner(area).width as usize;
    let accent = app.config().display().accent();

    if nav.rows().is_empty() {
        let text = if nav.current_listing().is_some() {
            "[Empty]"
        } else {
            ""
        };
        frame.render_widget(
            Paragraph::new(Span::styled(text, Style::default().fg(Color::DarkGray))).block(block),
            area,
        );
        return;
    }

    let items: Vec<ListItem> = nav
        .rows()
        .iter()
        .map(|row| {
            let entry = row.entry();
            let marker = match (entry.is_dir(), row.is_expanded()) {
                (true, true) => "▾ ",
                (true, false) => "▸ ",
                _ => "  ",
            };
            let indent = "  ".repeat(row.depth());
            let prefix = format!("{indent}{marker}");
            let name_width = inner_width.saturating_sub(prefix.width());
            let name = sanitize_to_exact_width(&display_name(entry), name_width);

            let style = if entry.is_dir() {
                Style::default().fg(accent)
            } else if entry.is_hidden() {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default()
            };
            ListItem::new(Line::from(vec![
                Span::styled(prefix, Style::default().fg(Color::DarkGray)),
                Span::styled(name, style),
            ]))
        })
        .collect();

    let list = List::new(items).block(block).highlight_style(
        Style::default()
            .bg(accent)
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD),
    );
    let mut state = ListState::default();
    state.select(Some(nav.selected_idx()));
    frame.render_stateful_widget(list, area, &mut state);
}

pub fn draw_preview(frame: &mut Frame, app: &AppState, area: Rect, block: Block) {
    let preview = app.preview();
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(result) = preview.result() else {
        if preview.is_loading() {
            frame.render_widget(
                Paragraph::new(Span::styled("loading…", Style::default().fg(Color::DarkGray))),
                inner,
            );
        }
        return;
    };

    let scroll = preview.scroll();
    let height = inner.height as usize;
    let display = app.config().display();

    match result {
        RenderResult::Text {
            content, language, ..
        } => {
            let view = app.view();
            let theme = highlight::theme(view.theme_name());
            let as_markdown =
                view.render_markdown() && language.as_deref() == Some(markdown::LANGUAGE);
            let lines = if as_markdown {
                markdown::render(content, theme, display.accent(), scroll + height)
            } else {
                highlight::highlight(content, language.as_deref(), theme, scroll + height)
            };
            let lines = if view.line_numbers() && !as_markdown {
                number_lines(lines, scroll)
            } else {
                lines.into_iter().skip(scroll).collect()
            };
            frame.render_widget(Paragraph::new(lines), inner);
        }
        RenderResult::Image {
            pixels,
            width,
            height: img_height,
        } => {
            let lines = half_blocks(pixels, *width, *img_height, inner.width, inner.height, scroll);
            frame.render_widget(Paragraph::new(lines), inner);
        }
        RenderResult::Table { columns, rows, .. } => {
            draw_table(frame, inner, columns, rows, scroll, display.accent());
        }
        RenderResult::Directory { listing } => {
            frame.render_widget(Paragraph::new(listing_lines(listing, scroll, height)), inner);
        }
        RenderResult::Binary { size, mime_guess } => {
            let lines = vec![
                Line::from(Span::styled(
                    "binary file",
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(format!("size: {}", format_file_size(*size, false))),
                Line::from(format!("type: {mime_guess}")),
            ];
            frame.render_widget(Paragraph::new(lines), inner);
        }
        RenderResult::Error { kind, message } => {
            frame.render_widget(
                Paragraph::new(Span::styled(
                    error_banner(*kind, message),
                    Style::default().fg(Color::Red),
                ))
                .wrap(Wrap { trim: true }),
                inner,
            );
        }
    }
}

fn number_lines(lines: Vec<Line<'static>>, scroll: usize) -> Vec<Line<'static>> {
    let total = lines.len();
    let gutter = total.to_string().len().max(3);
    lines
        .into_iter()
        .enumerate()
        .skip(scroll)
        .map(|(i, line)| {
            let mut spans = vec![Span::styled(
                format!("{:>gutter$} ", i + 1),
                Style::default().fg(Color::DarkGray),
            )];
            spans.extend(line.spans);
            Line::from(spans)
        })
        .collect()
}

fn listing_lines(listing: &DirectoryListing, scroll: usize, height: usize) -> Vec<Line<'static>> {
    listing
        .entries()
        .iter()
        .skip(scroll)
        .take(height)
        .map(|entry| {
            let name = sanitize_line(&display_name(entry));
            let style = if entry.is_dir() {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            Line::from(vec![
                Span::styled(name, style),
                Span::styled(
                    format!("  {}", format_file_size(entry.size(), entry.is_dir())),
                    Style::default().fg(Color::DarkGray),
                ),
            ])
        })
        .collect()
}

fn draw_table(
    frame: &mut Frame,
    area: Rect,
    columns: &[String],
    rows: &[Vec<String>],
    scroll: usize,
    accent: Color,
) {
    let visible = rows
        .iter()
        .skip(scroll)
        .take(area.height.saturating_sub(1) as usize);

    let widths: Vec<Constraint> = (0..columns.len())
        .map(|i| {
            let widest = rows
                .iter()
                .take(200)
                .filter_map(|r| r.get(i))
                .chain(columns.get(i))
                .map(|c| c.width())
                .max()
                .unwrap_or(1);
            Constraint::Length(widest.clamp(1, MAX_COLUMN_WIDTH) as u16)
        })
        .collect();

    let header = Row::new(columns.iter().map(|c| sanitize_line(c))).style(
        Style::default()
            .fg(accent)
            .add_modifier(Modifier::BOLD),
    );
    let body: Vec<Row> = visible
        .map(|r| Row::new(r.iter().map(|c| sanitize_line(c))))
        .collect();

    frame.render_widget(Table::new(body, widths).header(header).column_spacing(2), area);
}

/// Downsamples RGBA pixels into rows of `▀` cells: the foreground paints the upper pixel,
/// the background the lower one.
pub fn half_blocks(
    pixels: &[u8],
    width: u32,
    height: u32,
    cols: u16,
    rows: u16,
    scroll: usize,
) -> Vec<Line<'static>> {
    if width == 0 || height == 0 || cols == 0 || rows == 0 {
        return Vec::new();
    }
    let (width, height) = (width as usize, height as usize);
    let cols = cols as usize;
    let px_rows = rows as usize * 2;

    // never upscale; keep the aspect ratio
    let scale = (width as f64 / cols as f64)
        .max(height as f64 / px_rows as f64)
        .max(1.0);
    let out_w = ((width as f64 / scale) as usize).max(1);
    let out_h = ((height as f64 / scale) as usize).max(1);

    let sample = |x: usize, y: usize| -> Color {
        let sx = ((x as f64 * scale) as usize).min(width - 1);
        let sy = ((y as f64 * scale) as usize).min(height - 1);
        let i = (sy * width + sx) * 4;
        match pixels.get(i..i + 4) {
            Some([r, g, b, a]) if *a >= 128 => Color::Rgb(*r, *g, *b),
            _ => Color::Reset,
        }
    };

    (0..out_h.div_ceil(2))
        .skip(scroll)
        .take(rows as usize)
        .map(|cell_y| {
            let spans: Vec<Span<'static>> = (0..out_w)
                .map(|x| {
                    let top = sample(x, cell_y * 2);
                    let bottom = if cell_y * 2 + 1 < out_h {
                        sample(x, cell_y * 2 + 1)
                    } else {
                        Color::Reset
                    };
                    Span::styled("▀", Style::default().fg(top).bg(bottom))
                })
                .collect();
            Line::from(spans)
        })
        .collect()
}
