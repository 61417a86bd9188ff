//! Terminal UI for lookout.
//!
//! - [render]: the frame entry point and layout.
//! - [panes]: the tree and preview panes.
//! - [widgets]: header, status bar and pane blocks.
//! - [highlight]: syntect highlighting for text previews.
//! - [markdown]: formatted Markdown previews.

pub mod highlight;
pub mod markdown;
pub mod panes;
pub mod render;
pub mod widgets;
