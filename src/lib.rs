//! Internal library crate for lookout.
//!
//! The shipped application is the `lk` binary (`src/main.rs`).
//!
//! This library exists to share code between targets (binary, tests) and to keep modules organized.
//! The path and render engine under [core] has no terminal dependencies; [app] and [ui] build
//! the browser on top of it.

pub mod app;
pub mod config;
pub mod core;
pub mod ui;
pub mod utils;
