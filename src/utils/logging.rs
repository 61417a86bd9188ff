//! File logging for lookout.
//!
//! The terminal belongs to ratatui, so logs go to `$XDG_STATE_HOME/lookout/lookout.log`.
//! Filtering follows `LOOKOUT_LOG` (EnvFilter syntax) and defaults to `info`, or `debug`
//! with `--debug`.

use crate::utils::state_dir;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const LOG_ENV: &str = "LOOKOUT_LOG";
pub const LOG_FILE: &str = "lookout.log";

/// Default log file location.
pub fn default_log_path() -> PathBuf {
    state_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(LOG_FILE)
}

/// Filter from `LOOKOUT_LOG`, falling back to `info` or `debug`.
pub fn env_filter(debug: bool) -> EnvFilter {
    let default = if debug { "debug" } else { "info" };
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default))
}

/// Build a subscriber writing to `log_file`.
pub fn build_subscriber(log_file: File, filter: EnvFilter) -> impl tracing::Subscriber + Send + Sync {
    let fmt_layer = fmt::layer()
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .with_thread_names(true);

    tracing_subscriber::registry().with(fmt_layer).with(filter)
}

/// Installs the global subscriber. Returns the log path on success.
///
/// Failure to open the log file is not fatal; the caller runs without logging.
pub fn init(debug: bool) -> io::Result<PathBuf> {
    let path = default_log_path();
    let file = open_log(&path)?;
    build_subscriber(file, env_filter(debug))
        .try_init()
        .map_err(|e| io::Error::other(e.to_string()))?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "lookout started");
    Ok(path)
}

fn open_log(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
