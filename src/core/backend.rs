//! Backend adapters: the uniform list/stat/read surface over every storage kind.
//!
//! Each adapter implements [Backend] for one [Scheme](crate::core::address::Scheme).
//! Adapters are shared between worker threads as `Arc<dyn Backend>` and must be safe to call
//! concurrently; adapters whose transport is serial (the remote shell) serialize internally.

pub mod code_host;
pub mod local;
pub mod object_store;
pub mod remote_shell;

use crate::core::address::PathAddress;
use crate::core::error::Result;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

pub use code_host::{CodeHostBackend, CodeHostOptions};
pub use local::LocalBackend;
pub use object_store::{ObjectStoreBackend, ObjectStoreOptions};
pub use remote_shell::{RemoteShellBackend, RemoteShellOptions};

/// One child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    name: String,
    is_dir: bool,
    size: Option<u64>,
    modified: Option<SystemTime>,
    metadata: BTreeMap<String, String>,
}

impl DirectoryEntry {
    pub fn new(name: impl Into<String>, is_dir: bool) -> Self {
        Self {
            name: name.into(),
            is_dir,
            size: None,
            modified: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_size(mut self, size: Option<u64>) -> Self {
        self.size = size;
        self
    }

    pub fn with_modified(mut self, modified: Option<SystemTime>) -> Self {
        self.modified = modified;
        self
    }

    /// Attaches an opaque backend-specific attribute (etag, owner, mode, ...).
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    #[inline]
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    #[inline]
    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    #[inline]
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    #[inline]
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }
}

/// Result of listing a directory.
///
/// Entries are always ordered directories first, then files, each group case-insensitively
/// by name. The only way to build a listing is [DirectoryListing::new], which sorts.
#[derive(Debug, Clone)]
pub struct DirectoryListing {
    address: PathAddress,
    entries: Vec<DirectoryEntry>,
    fetched_at: Instant,
    revision: Option<String>,
}

impl DirectoryListing {
    pub fn new(
        address: PathAddress,
        mut entries: Vec<DirectoryEntry>,
        revision: Option<String>,
    ) -> Self {
        entries.sort_by_cached_key(|e| (!e.is_dir, e.name.to_lowercase(), e.name.clone()));
        Self {
            address,
            entries,
            fetched_at: Instant::now(),
            revision,
        }
    }

    #[inline]
    pub fn address(&self) -> &PathAddress {
        &self.address
    }

    #[inline]
    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    #[inline]
    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    #[inline]
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&DirectoryEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Age of the listing.
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

/// Uniform operations over one storage kind.
///
/// Implementations must be callable from several worker threads at once.
pub trait Backend: Send + Sync {
    /// Immediate children of a directory address.
    fn list(&self, addr: &PathAddress) -> Result<DirectoryListing>;

    /// Metadata of a single address.
    fn stat(&self, addr: &PathAddress) -> Result<DirectoryEntry>;

    /// Up to `len` bytes starting at `offset`. Short reads happen at end of object.
    fn open_range(&self, addr: &PathAddress, offset: u64, len: u64) -> Result<Vec<u8>>;

    fn exists(&self, addr: &PathAddress) -> Result<bool>;

    /// Cheap freshness token for a directory.
    ///
    /// `known` is the revision stored with the cached listing; adapters that answer with a
    /// conditional request use it. `Ok(None)` means the backend cannot probe, and the cache
    /// falls back to pure TTL.
    fn probe_revision(&self, addr: &PathAddress, known: Option<&str>) -> Result<Option<String>> {
        let _ = (addr, known);
        Ok(None)
    }

    /// Releases sessions or sockets. Called by the registry on teardown or invalidation.
    fn shutdown(&self) {}

    /// Short label for logs and the status line.
    fn label(&self) -> &str;
}

impl fmt::Debug for dyn Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Backend({})", self.label())
    }
}

/// Shared handle to a live backend client.
pub type BackendClient = Arc<dyn Backend>;

/// Bounded exponential backoff for transient network failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    retries: u32,
    backoff: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, backoff: Duration) -> Self {
        Self { retries, backoff }
    }

    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    #[inline]
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Runs `op`, retrying only errors that are [retryable](crate::core::error::BrowseError::is_retryable).
    pub fn run<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            match op() {
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    let delay = self.backoff.saturating_mul(1 << attempt.min(16));
                    attempt += 1;
                    tracing::warn!(
                        op = what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transient failure"
                    );
                    thread::sleep(delay);
                }
                other => return other,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(100))
    }
}

/// Everything backend construction needs from the configuration.
#[derive(Debug, Clone)]
pub struct BackendOptions {
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub object_store: ObjectStoreOptions,
    pub code_host: CodeHostOptions,
    pub remote_shell: RemoteShellOptions,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            retry: RetryPolicy::default(),
            object_store: ObjectStoreOptions::default(),
            code_host: CodeHostOptions::default(),
            remote_shell: RemoteShellOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::Scheme;
    use crate::core::error::{BrowseError, ErrorKind};

    use std::cell::Cell;

    fn addr() -> PathAddress {
        PathAddress::new(Scheme::ObjectStore, "bucket", ["dir"], None)
    }

    #[test]
    fn listing_sorts_dirs_first_case_insensitive() {
        let listing = DirectoryListing::new(
            addr(),
            vec![
                DirectoryEntry::new("b.txt", false),
                DirectoryEntry::new("Zeta", true),
                DirectoryEntry::new("A.txt", false),
                DirectoryEntry::new("alpha", true),
            ],
            None,
        );
        let names: Vec<&str> = listing.entries().iter().map(|e| e.name()).collect();
        assert_eq!(names, ["alpha", "Zeta", "A.txt", "b.txt"]);
    }

    #[test]
    fn retry_stops_on_final_errors() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let res: Result<()> = policy.run("list", || {
            calls.set(calls.get() + 1);
            Err(BrowseError::auth("nope"))
        });
        assert_eq!(res.map_err(|e| e.kind()), Err(ErrorKind::Auth));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn retry_retries_network_errors_up_to_bound() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let res: Result<()> = policy.run("list", || {
            calls.set(calls.get() + 1);
            Err(BrowseError::network("reset"))
        });
        assert!(res.is_err());
        assert_eq!(calls.get(), 3);

        calls.set(0);
        let ok = policy.run("list", || {
            calls.set(calls.get() + 1);
            if calls.get() < 2 {
                Err(BrowseError::network("blip"))
            } else {
                Ok(7)
            }
        });
        assert_eq!(ok, Ok(7));
    }
}
