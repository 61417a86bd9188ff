//! Engine configuration: cache, network, render ceilings and per-backend settings.
//!
//! Each table converts into the option struct the matching core module takes, so the core
//! never sees serde types.

use crate::core::backend::{
    BackendOptions, CodeHostOptions, ObjectStoreOptions, RemoteShellOptions, RetryPolicy,
};
use crate::core::cache::{CacheSettings, RevalidatePolicy};
use crate::core::render::RenderLimits;
use crate::utils::clamp_setting;

use serde::Deserialize;

use std::time::Duration;

/// `[cache]`
#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct Cache {
    capacity: usize,
    ttl_secs: u64,
    revalidate: RevalidatePolicy,
}

impl Default for Cache {
    fn default() -> Self {
        let defaults = CacheSettings::default();
        Cache {
            capacity: defaults.capacity,
            ttl_secs: defaults.ttl.as_secs(),
            revalidate: defaults.revalidate,
        }
    }
}

impl Cache {
    pub fn settings(&self) -> CacheSettings {
        CacheSettings {
            capacity: clamp_setting("cache.capacity", self.capacity, 1, 65_536),
            ttl: Duration::from_secs(self.ttl_secs),
            revalidate: self.revalidate,
        }
    }
}

/// `[network]`
#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct Network {
    timeout_secs: u64,
    retries: u32,
    backoff_ms: u64,
}

impl Default for Network {
    fn default() -> Self {
        Network {
            timeout_secs: 15,
            retries: 2,
            backoff_ms: 100,
        }
    }
}

impl Network {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            clamp_setting("network.retries", self.retries, 0, 10),
            Duration::from_millis(self.backoff_ms),
        )
    }
}

/// `[limits]`
#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct Limits {
    sample_bytes: u64,
    text_bytes: u64,
    image_bytes: u64,
    image_max_side: u32,
    image_max_pixels: u64,
    table_bytes: u64,
    table_rows: usize,
}

impl Default for Limits {
    fn default() -> Self {
        let d = RenderLimits::default();
        Limits {
            sample_bytes: d.sample_bytes,
            text_bytes: d.text_bytes,
            image_bytes: d.image_bytes,
            image_max_side: d.image_max_side,
            image_max_pixels: d.image_max_pixels,
            table_bytes: d.table_bytes,
            table_rows: d.table_rows,
        }
    }
}

impl Limits {
    /// Render ceilings. `max_file_size` comes from `[general]`.
    pub fn render_limits(&self, max_file_size: u64) -> RenderLimits {
        RenderLimits {
            sample_bytes: clamp_setting("limits.sample_bytes", self.sample_bytes, 512, 1 << 20),
            text_bytes: self.text_bytes.max(1),
            image_bytes: self.image_bytes.max(1),
            image_max_side: clamp_setting("limits.image_max_side", self.image_max_side, 16, 8192),
            image_max_pixels: clamp_setting(
                "limits.image_max_pixels",
                self.image_max_pixels,
                1 << 16,
                1 << 28,
            ),
            table_bytes: self.table_bytes.max(1),
            table_rows: self.table_rows.max(1),
            max_file_size,
        }
    }
}

/// `[object_store]`
#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct ObjectStore {
    endpoint: Option<String>,
    region: Option<String>,
    anonymous: bool,
}

/// `[code_host]`
#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct CodeHost {
    api_url: String,
    token_var: String,
}

impl Default for CodeHost {
    fn default() -> Self {
        let d = CodeHostOptions::default();
        CodeHost {
            api_url: d.api_url,
            token_var: d.token_var,
        }
    }
}

/// `[remote_shell]`
#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct RemoteShell {
    ssh_command: String,
    idle_timeout_secs: u64,
    extra_args: Vec<String>,
}

impl Default for RemoteShell {
    fn default() -> Self {
        let d = RemoteShellOptions::default();
        RemoteShell {
            ssh_command: d.ssh_command,
            idle_timeout_secs: d.idle_timeout.as_secs(),
            extra_args: d.extra_args,
        }
    }
}

/// Builds the options every backend adapter is constructed with.
pub fn backend_options(
    network: &Network,
    object_store: &ObjectStore,
    code_host: &CodeHost,
    remote_shell: &RemoteShell,
) -> BackendOptions {
    BackendOptions {
        timeout: network.timeout(),
        retry: network.retry(),
        object_store: ObjectStoreOptions {
            endpoint: object_store.endpoint.clone().filter(|s| !s.trim().is_empty()),
            region: object_store.region.clone().filter(|s| !s.trim().is_empty()),
            anonymous: object_store.anonymous,
        },
        code_host: CodeHostOptions {
            api_url: code_host.api_url.trim_end_matches('/').to_string(),
            token_var: code_host.token_var.clone(),
        },
        remote_shell: RemoteShellOptions {
            ssh_command: remote_shell.ssh_command.clone(),
            idle_timeout: Duration::from_secs(remote_shell.idle_timeout_secs),
            extra_args: remote_shell.extra_args.clone(),
        },
    }
}
