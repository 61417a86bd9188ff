//! The general configuration settings for lookout.
//!
//! [General] is deserialized from the `[general]` table of lookout.toml; [InternalGeneral] is
//! the clamped form the session reads.

use crate::core::worker::{DEFAULT_WORKERS, MAX_WORKERS};
use crate::utils::clamp_setting;

use serde::Deserialize;

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct General {
    show_hidden: bool,
    workers: usize,
    max_file_size_mb: u64,
    readme_preview: bool,
}

impl Default for General {
    fn default() -> Self {
        General {
            show_hidden: false,
            workers: DEFAULT_WORKERS,
            max_file_size_mb: 20,
            readme_preview: true,
        }
    }
}

#[derive(Debug)]
pub struct InternalGeneral {
    show_hidden: bool,
    workers: usize,
    max_file_size: u64,
    readme_preview: bool,
}

impl From<General> for InternalGeneral {
    fn from(g: General) -> Self {
        Self {
            show_hidden: g.show_hidden,
            workers: clamp_setting("general.workers", g.workers, 1, MAX_WORKERS),
            max_file_size: g.max_file_size_mb.saturating_mul(1024 * 1024),
            readme_preview: g.readme_preview,
        }
    }
}

impl InternalGeneral {
    #[inline]
    pub fn show_hidden(&self) -> bool {
        self.show_hidden
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Files above this size are not decoded as images.
    #[inline]
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    #[inline]
    pub fn readme_preview(&self) -> bool {
        self.readme_preview
    }
}
