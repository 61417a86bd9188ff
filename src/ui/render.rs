//! UI renderer implementation.
//!
//! Contains the top-level `render` entry point used by the terminal loop and the layout
//! helper that splits the screen into header, tree, preview and status rows.
//!
//! Pure rendering: reads state and config, produces widgets.

use crate::app::{AppState, LayoutMetrics};
use crate::ui::{panes, widgets};

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
};

/// Areas of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Areas {
    pub header: Rect,
    pub tree: Rect,
    pub preview: Rect,
    pub status: Rect,
}

/// Renders the whole UI for one frame.
pub fn render(frame: &mut Frame, app: &mut AppState) {
    let ratio = app.config().display().preview_ratio();
    let areas = layout(frame.area(), ratio, app.view().show_tree());
    app.update_layout_metrics(metrics(&areas));

    let accent = app.config().display().accent();
    widgets::draw_header(frame, app, areas.header);

    let tree_title = match app.nav().current().name() {
        Some(name) => name.to_string(),
        None => app.nav().current().to_string(),
    };
    if areas.tree.width > 0 {
        panes::draw_tree(
            frame,
            app,
            areas.tree,
            widgets::get_pane_block(&tree_title, accent),
        );
    }

    let preview_title = app
        .preview()
        .address()
        .and_then(|a| a.name())
        .unwrap_or("Preview")
        .to_string();
    panes::draw_preview(
        frame,
        app,
        areas.preview,
        widgets::get_pane_block(&preview_title, accent),
    );

    widgets::draw_status_bar(frame, app, areas.status);
}

/// Splits the screen. `preview_ratio` is the preview's share of the width in percent.
/// With the tree hidden the preview takes the full width and the tree area is empty.
pub fn layout(size: Rect, preview_ratio: u16, show_tree: bool) -> Areas {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(size);

    let ratio = if show_tree { preview_ratio.min(100) } else { 100 };
    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(100 - ratio),
            Constraint::Percentage(ratio),
        ])
        .split(rows[1]);

    Areas {
        header: rows[0],
        tree: panes[0],
        preview: panes[1],
        status: rows[2],
    }
}

/// Inner sizes of the bordered panes.
fn metrics(areas: &Areas) -> LayoutMetrics {
    LayoutMetrics {
        tree_width: areas.tree.width.saturating_sub(2) as usize,
        preview_width: areas.preview.width.saturating_sub(2) as usize,
        preview_height: areas.preview.height.saturating_sub(2) as usize,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_splits_by_ratio() {
        let areas = layout(Rect::new(0, 0, 100, 20), 60, true);
        assert_eq!(areas.header.height, 1);
        assert_eq!(areas.status.height, 1);
        assert_eq!(areas.tree.width + areas.preview.width, 100);
        assert_eq!(areas.preview.width, 60);
        assert_eq!(areas.tree.height, 18);

        let m = metrics(&areas);
        assert_eq!(m.preview_width, 58);
        assert_eq!(m.preview_height, 16);
    }

    #[test]
    fn hidden_tree_gives_the_preview_full_width() {
        let areas = layout(Rect::new(0, 0, 100, 20), 60, false);
        assert_eq!(areas.tree.width, 0);
        assert_eq!(areas.preview.width, 100);
        assert_eq!(metrics(&areas).tree_width, 0);
    }
}
