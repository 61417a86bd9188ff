//! The path & render engine.
//!
//! Glues the registry, the directory cache and the renderer dispatch into the two operations
//! the session needs: list a directory and render an address. Shared by all workers as an
//! `Arc<Engine>`.
//!
//! Any call failing with an auth error drops the backend client, so the next attempt builds a
//! fresh one with whatever credentials are current.

use crate::core::address::PathAddress;
use crate::core::backend::{Backend, BackendClient, DirectoryEntry, DirectoryListing};
use crate::core::cache::DirectoryCache;
use crate::core::error::{ErrorKind, Result};
use crate::core::registry::BackendRegistry;
use crate::core::render::{RenderRequest, RenderResult, RendererDispatch};

use std::sync::Arc;

pub struct Engine {
    registry: BackendRegistry,
    cache: DirectoryCache,
    dispatch: RendererDispatch,
}

impl Engine {
    pub fn new(registry: BackendRegistry, cache: DirectoryCache, dispatch: RendererDispatch) -> Self {
        Self {
            registry,
            cache,
            dispatch,
        }
    }

    #[inline]
    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    #[inline]
    pub fn cache(&self) -> &DirectoryCache {
        &self.cache
    }

    #[inline]
    pub fn dispatch(&self) -> &RendererDispatch {
        &self.dispatch
    }

    fn client(&self, addr: &PathAddress) -> Result<BackendClient> {
        self.registry.client(addr)
    }

    /// Drops the client after an auth failure.
    fn observe<T>(&self, addr: &PathAddress, result: Result<T>) -> Result<T> {
        if let Err(e) = &result
            && e.kind() == ErrorKind::Auth
        {
            tracing::warn!(address = %addr, error = %e, "auth failure, dropping client");
            self.registry.invalidate(addr);
        }
        result
    }

    /// Listing of `addr` through the cache. `force` skips whatever is cached.
    pub fn list(&self, addr: &PathAddress, force: bool) -> Result<Arc<DirectoryListing>> {
        if force {
            self.cache.invalidate(addr);
        }
        let result = self
            .client(addr)
            .and_then(|client| self.cache.get(addr, client.as_ref()));
        self.observe(addr, result)
    }

    pub fn stat(&self, addr: &PathAddress) -> Result<DirectoryEntry> {
        let result = self
            .client(addr)
            .and_then(|client| self.resolve_entry(client.as_ref(), addr));
        self.observe(addr, result)
    }

    /// Metadata from the cached parent listing when there is one, else a backend stat.
    fn resolve_entry(&self, client: &dyn Backend, addr: &PathAddress) -> Result<DirectoryEntry> {
        if let Some(entry) = self.cache.cached_entry(addr) {
            tracing::debug!(address = %addr, "stat served from cached parent listing");
            return Ok(entry);
        }
        client.stat(addr)
    }

    pub fn exists(&self, addr: &PathAddress) -> Result<bool> {
        let result = self.client(addr).and_then(|client| client.exists(addr));
        self.observe(addr, result)
    }

    /// Renders any address. Directories render as their listing; unsupported files fall
    /// back to `Binary`. Failures come back as `RenderResult::Error`, never as a panic.
    pub fn render(&self, request: &RenderRequest) -> RenderResult {
        let addr = &request.address;
        let client = match self.client(addr) {
            Ok(client) => client,
            Err(e) => return RenderResult::from_error(&e),
        };

        let entry = match self.observe(addr, self.resolve_entry(client.as_ref(), addr)) {
            Ok(entry) => entry,
            Err(e) => return RenderResult::from_error(&e),
        };

        if entry.is_dir() {
            return match self.list(addr, false) {
                Ok(listing) => RenderResult::Directory { listing },
                Err(e) => RenderResult::from_error(&e),
            };
        }

        let result = self
            .dispatch
            .render_or_fallback(client.as_ref(), request, &entry);
        if result.error_kind() == Some(ErrorKind::Auth) {
            self.registry.invalidate(addr);
        }
        result
    }

    pub fn invalidate(&self, addr: &PathAddress) {
        self.cache.invalidate(addr);
    }

    pub fn shutdown(&self) {
        self.cache.clear();
        self.registry.shutdown();
    }
}
