//! Core runtime logic for lookout.
//!
//! The non-UI engine pieces:
//! - [address]: the normalized [PathAddress] every other module is keyed on.
//! - [backend]: the [Backend] trait and its local, object-store, code-host and remote-shell adapters.
//! - [registry]: lazily created, shared backend clients and credential lookup.
//! - [cache]: the bounded, coalescing directory listing cache.
//! - [classify] and [render]: content classification and the ordered decoder dispatch.
//! - [engine]: the glue the workers call into.
//! - [worker]: the background fetch pool and its token protocol.
//! - [terminal]: terminal setup/teardown and the crossterm/ratatui event loop.
//! - [formatter]: display helpers for sizes, times and fixed-width lines.

pub mod address;
pub mod backend;
pub mod cache;
pub mod classify;
pub mod engine;
pub mod error;
pub mod formatter;
pub mod registry;
pub mod render;
pub mod terminal;
pub mod worker;

pub use address::{PathAddress, Scheme};
pub use backend::{Backend, BackendClient, BackendOptions, DirectoryEntry, DirectoryListing};
pub use cache::{CacheSettings, DirectoryCache, RevalidatePolicy};
pub use classify::{RenderKind, classify};
pub use engine::Engine;
pub use error::{BrowseError, ErrorKind, Result};
pub use registry::{BackendRegistry, CredentialSource, EnvCredentials};
pub use render::{RenderLimits, RenderRequest, RenderResult, RendererDispatch};
pub use worker::{FetchResponse, FetchTask, FetchToken, Workers};
