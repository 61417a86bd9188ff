//! Small widgets shared by the renderer: pane blocks, header and status bar.

use crate::app::{AppState, Phase};
use crate::core::formatter::{entry_summary, format_age};
use crate::utils::display_address;

use ratatui::{
    Frame,
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

pub fn get_pane_block(title: &str, accent: Color) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(accent))
        .title(format!(" {title} "))
}

/// Current address, plus the age of its listing once loaded.
pub fn draw_header(frame: &mut Frame, app: &AppState, area: Rect) {
    let accent = app.config().display().accent();
    let nav = app.nav();
    let mut spans = vec![Span::styled(
        display_address(nav.current()),
        Style::default().fg(accent).add_modifier(Modifier::BOLD),
    )];
    if let Some(listing) = nav.current_listing() {
        spans.push(Span::styled(
            format!("  ({} ago)", format_age(listing.age())),
            Style::default().fg(Color::DarkGray),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Bottom line: phase or error on the left, counters on the right.
pub fn draw_status_bar(frame: &mut Frame, app: &AppState, area: Rect) {
    let nav = app.nav();
    let dim = Style::default().fg(Color::DarkGray);

    let left = match (app.notice(), nav.phase()) {
        (Some(notice), _) => Span::styled(
            notice.to_string(),
            Style::default().fg(app.config().display().accent()),
        ),
        (None, Phase::Error(_)) => Span::styled(
            nav.last_error().unwrap_or("error").to_string(),
            Style::default().fg(Color::Red),
        ),
        (None, Phase::Listing(addr)) => {
            Span::styled(format!("listing {}", display_address(addr)), dim)
        }
        (None, Phase::Rendering(addr)) => {
            Span::styled(format!("loading {}", display_address(addr)), dim)
        }
        (None, Phase::Idle) => match nav.selected_row() {
            Some(row) if app.config().display().status_metadata() => {
                Span::raw(entry_summary(row.entry()))
            }
            _ => Span::raw(""),
        },
    };
    frame.render_widget(Paragraph::new(Line::from(left)), area);

    let mut right = Vec::new();
    if app.preview().result().is_some_and(|r| r.is_truncated()) {
        right.push(Span::styled("[truncated] ", Style::default().fg(Color::Yellow)));
    }
    if app.is_busy() {
        let tick = (std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() / 120)
            .unwrap_or(0)
            % SPINNER.len() as u128) as usize;
        right.push(Span::styled(format!("{} ", SPINNER[tick]), dim));
    }
    let total = nav.rows().len();
    let pos = if total == 0 { 0 } else { nav.selected_idx() + 1 };
    right.push(Span::styled(format!("{pos}/{total}"), dim));

    frame.render_widget(
        Paragraph::new(Line::from(right)).alignment(Alignment::Right),
        area,
    );
}
