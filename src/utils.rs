//! Miscellaneous utility functions for lookout.
//!
//! - [cli]: argument parsing and help text.
//! - [clipboard]: copying paths out of the app.
//! - [logging]: the file-backed tracing subscriber.
//! - [helpers]: colors, home/state directories, setting clamps.

pub mod cli;
pub mod clipboard;
pub mod helpers;
pub mod logging;

pub use helpers::{
    clamp_setting, display_address, get_home, parse_color, shorten_home_path, state_dir,
};
