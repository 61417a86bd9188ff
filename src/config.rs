//! Configuration for lookout, loaded from `lookout.toml`.
//!
//! - [load]: [Config], default path lookup and `--init` generation.
//! - [general], [display], [input]: session-facing tables.
//! - [engine]: cache, network, limits and per-backend tables.

pub mod display;
pub mod engine;
pub mod general;
pub mod input;
pub mod load;

pub use display::Display;
pub use general::{General, InternalGeneral};
pub use input::Keys;
pub use load::Config;
