//! Application state for lookout.
//!
//! - [state]: [AppState], the controller the terminal loop drives.
//! - [nav]: the navigation state machine and its fetch tokens.
//! - [preview]: the preview pane and its debounce.
//! - [keymap]: key bindings from the config.
//! - [view]: display switches toggled at runtime.

pub mod keymap;
pub mod nav;
pub mod preview;
pub mod state;
pub mod view;

pub use keymap::{Action, Keymap};
pub use nav::{NavState, Phase, Row, Update};
pub use preview::PreviewState;
pub use state::{AppState, KeypressResult, LayoutMetrics, build_engine};
pub use view::ViewState;
