//! The main config loading module for lookout.
//!
//! Handles loading and deserializing settings from `lookout.toml`.
//!
//! Provides the main [Config] struct and the internal [RawConfig] used for parsing, plus
//! the conversions into the option structs the engine is built from.
//!
//! Also implements default config generation for `lk --init`.

use crate::config::engine::{self, Cache, CodeHost, Limits, Network, ObjectStore, RemoteShell};
use crate::config::{Display, General, InternalGeneral, Keys};
use crate::core::backend::BackendOptions;
use crate::core::cache::CacheSettings;
use crate::core::render::RenderLimits;
use crate::utils::get_home;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::{fs, io};

pub const CONFIG_ENV: &str = "LOOKOUT_CONFIG";

/// Raw configuration as read from the toml file.
/// Deserialized directly, then converted into the main [Config] struct.
#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub(crate) struct RawConfig {
    general: General,
    cache: Cache,
    network: Network,
    limits: Limits,
    object_store: ObjectStore,
    code_host: CodeHost,
    remote_shell: RemoteShell,
    display: Display,
    keys: Keys,
}

/// Processed configuration used by lookout.
#[derive(Debug)]
pub struct Config {
    general: InternalGeneral,
    cache: CacheSettings,
    limits: RenderLimits,
    backends: BackendOptions,
    display: Display,
    keys: Keys,
}

impl From<RawConfig> for Config {
    fn from(raw: RawConfig) -> Self {
        let general = InternalGeneral::from(raw.general);
        let limits = raw.limits.render_limits(general.max_file_size());
        let backends = engine::backend_options(
            &raw.network,
            &raw.object_store,
            &raw.code_host,
            &raw.remote_shell,
        );
        Self {
            cache: raw.cache.settings(),
            limits,
            backends,
            general,
            display: raw.display,
            keys: raw.keys,
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    /// If the file does not exist or fails to parse, returns the default configuration.
    ///
    /// Called by the entry point at startup.
    pub fn load() -> Self {
        let path = Self::default_path();

        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "config loaded");
                config
            }
            Err(e) => {
                eprintln!("Error reading config {}: {}", path.display(), e);
                tracing::warn!(path = %path.display(), error = %e, "invalid config, using defaults");
                Self::default()
            }
        }
    }

    /// Parses the file at `path`.
    pub fn load_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> io::Result<Self> {
        toml::from_str::<RawConfig>(content)
            .map(Config::from)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }

    // Getters

    #[inline]
    pub fn general(&self) -> &InternalGeneral {
        &self.general
    }

    #[inline]
    pub fn cache(&self) -> CacheSettings {
        self.cache
    }

    #[inline]
    pub fn limits(&self) -> &RenderLimits {
        &self.limits
    }

    #[inline]
    pub fn backends(&self) -> &BackendOptions {
        &self.backends
    }

    #[inline]
    pub fn display(&self) -> &Display {
        &self.display
    }

    #[inline]
    pub fn keys(&self) -> &Keys {
        &self.keys
    }

    /// Determine the default configuration file path.
    /// Checks the LOOKOUT_CONFIG environment variable first,
    /// then XDG_CONFIG_HOME,
    /// then defaults to ~/.config/lookout/lookout.toml.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }

        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg_config).join("lookout/lookout.toml");
        }

        if let Some(home) = get_home() {
            return home.join(".config/lookout/lookout.toml");
        }
        PathBuf::from("lookout.toml")
    }

    /// Generate a default configuration file at the specified path.
    /// If the file already exists, returns an error.
    pub fn generate_default(path: &Path) -> io::Result<()> {
        if path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("Config file already exists at {:?}", path),
            ));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, DEFAULT_TOML)?;
        println!("Default config generated at {:?}", path);
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

pub(crate) const DEFAULT_TOML: &str = r##"# lookout.toml - default configuration for lookout

# Note:
# Commented values are the internal defaults.
# Run `lk --config-help` for a description of every option.

[general]
show_hidden = false
# workers = 4
# max_file_size_mb = 20
# readme_preview = true

[cache]
# capacity = 256
# ttl_secs = 30
# revalidate = "always"      # "always", "expired" or "never"

[network]
# timeout_secs = 15
# retries = 2
# backoff_ms = 100

[limits]
# sample_bytes = 8192
# text_bytes = 1048576
# image_bytes = 20971520
# image_max_side = 1024
# image_max_pixels = 40000000
# table_bytes = 4194304
# table_rows = 1000

[object_store]
# endpoint = "http://localhost:9000"
# region = "us-east-1"
# anonymous = false

[code_host]
# api_url = "https://api.github.com"
# token_var = "GITHUB_TOKEN"

[remote_shell]
# ssh_command = "ssh"
# idle_timeout_secs = 300
# extra_args = []

[display]
# syntax_theme = "base16-ocean.dark"
# line_numbers = true
# preview_ratio = 60
# accent = "cyan"
# status_metadata = true
# render_markdown = true
# show_tree = true

# [keys]
# open = ["Enter", "l", "Right"]
# go_up = ["k", "Up"]
# go_down = ["j", "Down"]
# go_parent = ["h", "Left"]
# go_back = ["Backspace", "b"]
# go_to_top = ["g"]
# go_to_bottom = ["G"]
# toggle_expand = ["Tab", "space"]
# refresh = ["r", "Ctrl+r"]
# toggle_hidden = ["."]
# scroll_preview_up = ["K", "PageUp"]
# scroll_preview_down = ["J", "PageDown"]
# toggle_line_numbers = ["n"]
# cycle_theme = ["t"]
# toggle_tree = ["f"]
# toggle_markdown = ["m"]
# copy_path = ["c"]
# quit = ["q", "Esc", "Ctrl+c"]
"##;
