//! Directory listing cache.
//!
//! Bounded LRU keyed by normalized [PathAddress]. Entries expire after a TTL and, depending
//! on the [RevalidatePolicy], are checked against the backend's cheap freshness probe.
//!
//! Concurrent lookups of the same address while a fetch is outstanding are coalesced: the
//! first caller fetches, the others wait on the same in-flight slot and receive the same
//! result, error included. This replaces a per-key lock.

use crate::core::address::PathAddress;
use crate::core::backend::{Backend, DirectoryEntry, DirectoryListing};
use crate::core::error::{BrowseError, Result};

use lru::LruCache;
use serde::Deserialize;

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// When cached listings are checked against [Backend::probe_revision].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevalidatePolicy {
    /// Probe on every hit within the TTL.
    #[default]
    Always,
    /// Serve hits within the TTL blindly; probe once expired and extend on a match.
    Expired,
    /// TTL only.
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub capacity: usize,
    pub ttl: Duration,
    pub revalidate: RevalidatePolicy,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: 256,
            ttl: Duration::from_secs(30),
            revalidate: RevalidatePolicy::Always,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub fetches: u64,
    pub coalesced: u64,
}

struct CacheEntry {
    listing: Arc<DirectoryListing>,
    stored_at: Instant,
}

/// Rendezvous for callers waiting on the same fetch.
struct InFlight {
    result: Mutex<Option<Result<Arc<DirectoryListing>>>>,
    ready: Condvar,
    /// Set when the address was invalidated mid-fetch; the result is handed out but not stored.
    discarded: AtomicBool,
}

impl InFlight {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            ready: Condvar::new(),
            discarded: AtomicBool::new(false),
        }
    }

    fn complete(&self, result: Result<Arc<DirectoryListing>>) {
        let mut slot = self.result.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(result);
        self.ready.notify_all();
    }

    fn wait(&self) -> Result<Arc<DirectoryListing>> {
        let mut slot = self.result.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            slot = self.ready.wait(slot).unwrap_or_else(|e| e.into_inner());
        }
    }
}

struct Inner {
    entries: LruCache<PathAddress, CacheEntry>,
    inflight: HashMap<PathAddress, Arc<InFlight>>,
}

pub struct DirectoryCache {
    inner: Mutex<Inner>,
    ttl: Duration,
    revalidate: RevalidatePolicy,
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    coalesced: AtomicU64,
}

enum Lookup {
    Hit(Arc<DirectoryListing>),
    Probe(Arc<DirectoryListing>),
    Miss,
}

impl DirectoryCache {
    pub fn new(settings: CacheSettings) -> Self {
        let capacity = NonZeroUsize::new(settings.capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                inflight: HashMap::new(),
            }),
            ttl: settings.ttl,
            revalidate: settings.revalidate,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            fetches: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Listing for `addr`, from cache when still valid, otherwise fetched through `backend`.
    pub fn get(&self, addr: &PathAddress, backend: &dyn Backend) -> Result<Arc<DirectoryListing>> {
        match self.lookup(addr) {
            Lookup::Hit(listing) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(listing);
            }
            Lookup::Probe(listing) => {
                if self.still_fresh(addr, &listing, backend) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(listing);
                }
            }
            Lookup::Miss => {}
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.fetch(addr, backend)
    }

    fn lookup(&self, addr: &PathAddress) -> Lookup {
        let mut inner = self.lock();
        let Some(entry) = inner.entries.get(addr) else {
            return Lookup::Miss;
        };
        let within_ttl = entry.stored_at.elapsed() < self.ttl;
        let listing = Arc::clone(&entry.listing);

        match (self.revalidate, within_ttl) {
            (RevalidatePolicy::Never, true) | (RevalidatePolicy::Expired, true) => {
                Lookup::Hit(listing)
            }
            (RevalidatePolicy::Always, true) | (RevalidatePolicy::Expired, false) => {
                Lookup::Probe(listing)
            }
            (_, false) => Lookup::Miss,
        }
    }

    /// Compares the stored revision with a fresh probe. Probe failures count as stale.
    fn still_fresh(
        &self,
        addr: &PathAddress,
        listing: &Arc<DirectoryListing>,
        backend: &dyn Backend,
    ) -> bool {
        let expired = listing_expired(&self.lock(), addr, self.ttl);

        let probed = match backend.probe_revision(addr, listing.revision()) {
            Ok(probed) => probed,
            Err(e) => {
                tracing::debug!(address = %addr, error = %e, "freshness probe failed");
                return false;
            }
        };

        let fresh = match (probed.as_deref(), listing.revision()) {
            (Some(now), Some(known)) => now == known,
            // no probe support: pure TTL
            (None, _) => !expired,
            (Some(_), None) => false,
        };

        if fresh && expired {
            // revision confirmed after expiry: extend the entry
            if let Some(entry) = self.lock().entries.get_mut(addr) {
                entry.stored_at = Instant::now();
            }
        }
        tracing::debug!(address = %addr, fresh, "revalidated cached listing");
        fresh
    }

    fn fetch(&self, addr: &PathAddress, backend: &dyn Backend) -> Result<Arc<DirectoryListing>> {
        let slot = {
            let mut inner = self.lock();
            if let Some(existing) = inner.inflight.get(addr) {
                let existing = Arc::clone(existing);
                drop(inner);
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(address = %addr, "joined in-flight listing");
                return existing.wait();
            }
            let slot = Arc::new(InFlight::new());
            inner.inflight.insert(addr.clone(), Arc::clone(&slot));
            slot
        };

        self.fetches.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(address = %addr, backend = backend.label(), "fetching listing");
        let result = panic::catch_unwind(AssertUnwindSafe(|| backend.list(addr)))
            .unwrap_or_else(|_| Err(BrowseError::internal(format!("listing {} panicked", addr))))
            .map(Arc::new);

        {
            let mut inner = self.lock();
            if inner
                .inflight
                .get(addr)
                .is_some_and(|current| Arc::ptr_eq(current, &slot))
            {
                inner.inflight.remove(addr);
            }
            if let Ok(listing) = &result
                && !slot.discarded.load(Ordering::Acquire)
            {
                inner.entries.put(
                    addr.clone(),
                    CacheEntry {
                        listing: Arc::clone(listing),
                        stored_at: Instant::now(),
                    },
                );
            }
        }

        slot.complete(result.clone());
        result
    }

    /// Forces the next `get` for `addr` to refetch.
    pub fn invalidate(&self, addr: &PathAddress) {
        let mut inner = self.lock();
        inner.entries.pop(addr);
        if let Some(slot) = inner.inflight.remove(addr) {
            slot.discarded.store(true, Ordering::Release);
        }
    }

    /// Drops every entry that lives under `addr` (the address itself included).
    pub fn invalidate_tree(&self, addr: &PathAddress) {
        let mut inner = self.lock();
        let doomed: Vec<PathAddress> = inner
            .entries
            .iter()
            .map(|(k, _)| k)
            .filter(|k| *k == addr || addr.is_ancestor_of(k))
            .cloned()
            .collect();
        for key in doomed {
            inner.entries.pop(&key);
        }
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        for (_, slot) in inner.inflight.drain() {
            slot.discarded.store(true, Ordering::Release);
        }
    }

    /// Cached listing without touching recency or validity.
    pub fn peek(&self, addr: &PathAddress) -> Option<Arc<DirectoryListing>> {
        self.lock()
            .entries
            .peek(addr)
            .map(|entry| Arc::clone(&entry.listing))
    }

    /// Entry for `addr` taken from its parent's listing, if that listing is within the TTL.
    /// Never contacts the backend.
    pub fn cached_entry(&self, addr: &PathAddress) -> Option<DirectoryEntry> {
        let parent = addr.parent()?;
        let name = addr.name()?;
        let inner = self.lock();
        let entry = inner.entries.peek(&parent)?;
        if entry.stored_at.elapsed() >= self.ttl {
            return None;
        }
        entry.listing.find(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().entries.cap().get()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}

fn listing_expired(inner: &Inner, addr: &PathAddress, ttl: Duration) -> bool {
    inner
        .entries
        .peek(addr)
        .is_none_or(|entry| entry.stored_at.elapsed() >= ttl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::Scheme;
    use crate::core::backend::DirectoryEntry;
    use crate::core::error::ErrorKind;

    use std::sync::Barrier;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    /// Counts `list` calls; optionally slow, failing or with a moving revision.
    #[derive(Default)]
    struct Counting {
        lists: AtomicUsize,
        probes: AtomicUsize,
        delay: Duration,
        fail: bool,
        revision: Mutex<Option<String>>,
    }

    impl Backend for Counting {
        fn list(&self, addr: &PathAddress) -> Result<DirectoryListing> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            if self.fail {
                return Err(BrowseError::network("unreachable"));
            }
            let rev = self.revision.lock().map(|r| r.clone()).unwrap_or(None);
            Ok(DirectoryListing::new(
                addr.clone(),
                vec![DirectoryEntry::new("file.txt", false)],
                rev,
            ))
        }
        fn stat(&self, addr: &PathAddress) -> Result<DirectoryEntry> {
            Ok(DirectoryEntry::new(addr.name().unwrap_or("/"), true))
        }
        fn open_range(&self, _addr: &PathAddress, _o: u64, _l: u64) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
        fn exists(&self, _addr: &PathAddress) -> Result<bool> {
            Ok(true)
        }
        fn probe_revision(&self, _addr: &PathAddress, _known: Option<&str>) -> Result<Option<String>> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            Ok(self.revision.lock().map(|r| r.clone()).unwrap_or(None))
        }
        fn label(&self) -> &str {
            "counting"
        }
    }

    fn dir(name: &str) -> PathAddress {
        PathAddress::new(Scheme::RemoteShell, "host", ["srv", name], None)
    }

    fn cache(capacity: usize, ttl: Duration, revalidate: RevalidatePolicy) -> DirectoryCache {
        DirectoryCache::new(CacheSettings {
            capacity,
            ttl,
            revalidate,
        })
    }

    #[test]
    fn concurrent_gets_share_one_fetch() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let backend = Arc::new(Counting {
            delay: Duration::from_millis(150),
            ..Default::default()
        });
        let cache = Arc::new(cache(8, Duration::from_secs(30), RevalidatePolicy::Never));
        let barrier = Arc::new(Barrier::new(5));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let (backend, cache, barrier) =
                    (Arc::clone(&backend), Arc::clone(&cache), Arc::clone(&barrier));
                thread::spawn(move || {
                    barrier.wait();
                    cache.get(&dir("logs"), backend.as_ref())
                })
            })
            .collect();

        let mut listings = Vec::new();
        for h in handles {
            listings.push(h.join().map_err(|_| "worker panicked")??);
        }

        assert_eq!(backend.lists.load(Ordering::SeqCst), 1);
        assert!(listings.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        Ok(())
    }

    #[test]
    fn coalesced_waiters_share_the_error() {
        let backend = Arc::new(Counting {
            delay: Duration::from_millis(100),
            fail: true,
            ..Default::default()
        });
        let cache = Arc::new(cache(8, Duration::from_secs(30), RevalidatePolicy::Never));
        let barrier = Arc::new(Barrier::new(3));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let (backend, cache, barrier) =
                    (Arc::clone(&backend), Arc::clone(&cache), Arc::clone(&barrier));
                thread::spawn(move || {
                    barrier.wait();
                    cache.get(&dir("down"), backend.as_ref()).map(|_| ())
                })
            })
            .collect();

        for h in handles {
            let res = h.join().unwrap_or(Ok(()));
            assert_eq!(res.map_err(|e| e.kind()), Err(ErrorKind::Network));
        }
        assert_eq!(backend.lists.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn entries_come_from_a_fresh_parent_listing() -> Result<()> {
        let backend = Counting::default();
        let file = dir("logs").join("file.txt");

        let warm = cache(8, Duration::from_secs(30), RevalidatePolicy::Never);
        assert!(warm.cached_entry(&file).is_none());
        warm.get(&dir("logs"), &backend)?;
        let entry = warm.cached_entry(&file).ok_or_else(|| BrowseError::internal("no entry"))?;
        assert_eq!(entry.name(), "file.txt");
        assert!(warm.cached_entry(&dir("logs").join("other.txt")).is_none());

        let expired = cache(8, Duration::ZERO, RevalidatePolicy::Never);
        expired.get(&dir("logs"), &backend)?;
        assert!(expired.cached_entry(&file).is_none());
        assert_eq!(backend.probes.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn least_recently_used_is_evicted() -> Result<()> {
        let backend = Counting::default();
        let cache = cache(2, Duration::from_secs(30), RevalidatePolicy::Never);

        cache.get(&dir("a"), &backend)?;
        cache.get(&dir("b"), &backend)?;
        // touch a so b becomes the eviction candidate
        cache.get(&dir("a"), &backend)?;
        cache.get(&dir("c"), &backend)?;

        assert_eq!(cache.len(), 2);
        assert!(cache.peek(&dir("a")).is_some());
        assert!(cache.peek(&dir("b")).is_none());
        assert!(cache.peek(&dir("c")).is_some());
        assert_eq!(backend.lists.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[test]
    fn expired_entries_refetch() -> Result<()> {
        let backend = Counting::default();
        let cache = cache(4, Duration::ZERO, RevalidatePolicy::Never);
        cache.get(&dir("a"), &backend)?;
        cache.get(&dir("a"), &backend)?;
        assert_eq!(backend.lists.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn invalidate_forces_refetch() -> Result<()> {
        let backend = Counting::default();
        let cache = cache(4, Duration::from_secs(30), RevalidatePolicy::Never);
        cache.get(&dir("a"), &backend)?;
        cache.get(&dir("a"), &backend)?;
        assert_eq!(backend.lists.load(Ordering::SeqCst), 1);

        cache.invalidate(&dir("a"));
        cache.get(&dir("a"), &backend)?;
        assert_eq!(backend.lists.load(Ordering::SeqCst), 2);

        cache.clear();
        assert!(cache.is_empty());
        Ok(())
    }

    #[test]
    fn revision_change_is_detected_on_revalidation() -> Result<()> {
        let backend = Counting::default();
        *backend.revision.lock().map_err(|_| BrowseError::internal("poisoned"))? = Some("1".into());
        let cache = cache(4, Duration::from_secs(30), RevalidatePolicy::Always);

        cache.get(&dir("a"), &backend)?;
        cache.get(&dir("a"), &backend)?;
        assert_eq!(backend.lists.load(Ordering::SeqCst), 1);
        assert_eq!(backend.probes.load(Ordering::SeqCst), 1);

        *backend.revision.lock().map_err(|_| BrowseError::internal("poisoned"))? = Some("2".into());
        let listing = cache.get(&dir("a"), &backend)?;
        assert_eq!(backend.lists.load(Ordering::SeqCst), 2);
        assert_eq!(listing.revision(), Some("2"));
        Ok(())
    }

    #[test]
    fn backends_without_revisions_fall_back_to_ttl() -> Result<()> {
        let backend = Counting::default();
        let cache = cache(4, Duration::from_secs(30), RevalidatePolicy::Always);
        cache.get(&dir("a"), &backend)?;
        cache.get(&dir("a"), &backend)?;
        assert_eq!(backend.lists.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits, 1);
        Ok(())
    }
}
