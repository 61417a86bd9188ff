//! Background fetch coordinator for lookout.
//!
//! A fixed pool of worker threads pulls [FetchTask]s off a shared crossbeam channel, runs them
//! against the [Engine] and pushes [FetchResponse]s onto a single completion channel that the
//! session drains from its tick.
//!
//! Every task carries the [FetchToken] it was issued under. Workers never judge staleness
//! themselves: they run whatever they receive and the session drops completions whose token
//! is no longer the pending one.
//!
//! # Caution:
//! This module is the protocol boundary between the engine and the session. Adding or editing
//! variants requires matching changes in `app::state`.

use crate::core::address::PathAddress;
use crate::core::backend::DirectoryListing;
use crate::core::engine::Engine;
use crate::core::error::BrowseError;
use crate::core::render::{RenderRequest, RenderResult};

use crossbeam_channel::{Receiver, Sender, unbounded};

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

pub const DEFAULT_WORKERS: usize = 4;
pub const MAX_WORKERS: usize = 16;

/// Identifies one dispatched fetch. Issued in strictly increasing order by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FetchToken(u64);

impl FetchToken {
    #[inline]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }

    /// The token issued after this one.
    #[inline]
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for FetchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Work sent to the pool.
#[derive(Debug, Clone)]
pub enum FetchTask {
    LoadListing {
        address: PathAddress,
        token: FetchToken,
        force: bool,
    },
    Render {
        request: RenderRequest,
        token: FetchToken,
    },
}

impl FetchTask {
    pub fn token(&self) -> FetchToken {
        match self {
            FetchTask::LoadListing { token, .. } | FetchTask::Render { token, .. } => *token,
        }
    }

    pub fn address(&self) -> &PathAddress {
        match self {
            FetchTask::LoadListing { address, .. } => address,
            FetchTask::Render { request, .. } => &request.address,
        }
    }
}

/// Completions sent back to the session.
#[derive(Debug)]
pub enum FetchResponse {
    ListingLoaded {
        address: PathAddress,
        listing: Arc<DirectoryListing>,
        token: FetchToken,
    },
    /// Render results, including `RenderResult::Error`.
    Rendered {
        address: PathAddress,
        result: RenderResult,
        token: FetchToken,
    },
    /// A listing that could not be produced.
    Failed {
        address: PathAddress,
        error: BrowseError,
        token: FetchToken,
    },
}

impl FetchResponse {
    pub fn token(&self) -> FetchToken {
        match self {
            FetchResponse::ListingLoaded { token, .. }
            | FetchResponse::Rendered { token, .. }
            | FetchResponse::Failed { token, .. } => *token,
        }
    }

    pub fn address(&self) -> &PathAddress {
        match self {
            FetchResponse::ListingLoaded { address, .. }
            | FetchResponse::Rendered { address, .. }
            | FetchResponse::Failed { address, .. } => address,
        }
    }
}

/// The worker pool and its two channels.
///
/// Dropping `Workers` closes the task channel; threads finish their current task and exit.
pub struct Workers {
    task_tx: Option<Sender<FetchTask>>,
    response_rx: Receiver<FetchResponse>,
    engine: Arc<Engine>,
    active: Arc<AtomicUsize>,
    handles: Vec<JoinHandle<()>>,
}

impl Workers {
    /// Spawns `count` worker threads (clamped to `1..=16`) sharing `engine`.
    pub fn spawn(engine: Arc<Engine>, count: usize) -> Self {
        let count = count.clamp(1, MAX_WORKERS);
        let (task_tx, task_rx) = unbounded::<FetchTask>();
        let (res_tx, response_rx) = unbounded::<FetchResponse>();
        let active = Arc::new(AtomicUsize::new(0));

        let handles = (0..count)
            .filter_map(|i| {
                let task_rx = task_rx.clone();
                let res_tx = res_tx.clone();
                let engine = Arc::clone(&engine);
                let active = Arc::clone(&active);
                thread::Builder::new()
                    .name(format!("lookout-fetch-{i}"))
                    .spawn(move || start_fetch_worker(engine, task_rx, res_tx, active))
                    .map_err(|e| tracing::error!(error = %e, "failed to spawn fetch worker"))
                    .ok()
            })
            .collect();

        tracing::debug!(workers = count, "fetch pool started");

        Self {
            task_tx: Some(task_tx),
            response_rx,
            engine,
            active,
            handles,
        }
    }

    /// Queues a task. Returns `false` once the pool is shutting down.
    pub fn submit(&self, task: FetchTask) -> bool {
        tracing::debug!(address = %task.address(), token = %task.token(), "fetch queued");
        self.task_tx
            .as_ref()
            .is_some_and(|tx| tx.send(task).is_ok())
    }

    // Accessors

    #[inline]
    pub fn response_rx(&self) -> &Receiver<FetchResponse> {
        &self.response_rx
    }

    #[inline]
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Number of tasks currently executing.
    #[inline]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Closes the task channel, waits for the threads and tears down backend clients.
    pub fn shutdown(&mut self) {
        self.task_tx.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        self.engine.shutdown();
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Worker thread body: runs tasks until the task channel closes.
fn start_fetch_worker(
    engine: Arc<Engine>,
    task_rx: Receiver<FetchTask>,
    res_tx: Sender<FetchResponse>,
    active: Arc<AtomicUsize>,
) {
    while let Ok(task) = task_rx.recv() {
        active.fetch_add(1, Ordering::Relaxed);
        let token = task.token();
        let address = task.address().clone();

        let response = panic::catch_unwind(AssertUnwindSafe(|| run_task(&engine, task)))
            .unwrap_or_else(|_| {
                tracing::error!(address = %address, "fetch worker panicked");
                FetchResponse::Failed {
                    address,
                    error: BrowseError::internal("fetch worker panicked"),
                    token,
                }
            });

        active.fetch_sub(1, Ordering::Relaxed);
        if res_tx.send(response).is_err() {
            break;
        }
    }
}

fn run_task(engine: &Engine, task: FetchTask) -> FetchResponse {
    match task {
        FetchTask::LoadListing {
            address,
            token,
            force,
        } => match engine.list(&address, force) {
            Ok(listing) => FetchResponse::ListingLoaded {
                address,
                listing,
                token,
            },
            Err(error) => {
                tracing::debug!(address = %address, error = %error, "listing failed");
                FetchResponse::Failed {
                    address,
                    error,
                    token,
                }
            }
        },
        FetchTask::Render { request, token } => {
            let result = engine.render(&request);
            FetchResponse::Rendered {
                address: request.address,
                result,
                token,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::BackendOptions;
    use crate::core::cache::{CacheSettings, DirectoryCache};
    use crate::core::error::ErrorKind;
    use crate::core::registry::{BackendRegistry, MapCredentials};
    use crate::core::render::{RenderLimits, RendererDispatch};

    use rand::{Rng, rng};
    use std::collections::HashSet;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;

    fn engine() -> Arc<Engine> {
        Arc::new(Engine::new(
            BackendRegistry::new(BackendOptions::default(), Arc::new(MapCredentials::new())),
            DirectoryCache::new(CacheSettings::default()),
            RendererDispatch::new(RenderLimits::default()),
        ))
    }

    #[test]
    fn pool_size_is_clamped() {
        assert_eq!(Workers::spawn(engine(), 0).size(), 1);
        assert_eq!(Workers::spawn(engine(), 64).size(), MAX_WORKERS);
    }

    #[test]
    fn listing_and_render_round_trip() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::create_dir(dir.path().join("sub"))?;
        fs::write(dir.path().join("notes.txt"), "hello")?;
        let root = PathAddress::local(dir.path(), Path::new("/"));

        let workers = Workers::spawn(engine(), 2);
        assert!(workers.submit(FetchTask::LoadListing {
            address: root.clone(),
            token: FetchToken::new(1),
            force: false,
        }));
        match workers.response_rx().recv_timeout(Duration::from_secs(2))? {
            FetchResponse::ListingLoaded { listing, token, .. } => {
                assert_eq!(token, FetchToken::new(1));
                let names: Vec<_> = listing.entries().iter().map(|e| e.name()).collect();
                assert_eq!(names, vec!["sub", "notes.txt"]);
            }
            other => return Err(format!("unexpected {:?}", other).into()),
        }

        workers.submit(FetchTask::Render {
            request: RenderRequest::new(root.join("notes.txt")),
            token: FetchToken::new(2),
        });
        match workers.response_rx().recv_timeout(Duration::from_secs(2))? {
            FetchResponse::Rendered { result, .. } => {
                assert!(matches!(result, RenderResult::Text { ref content, .. } if content == "hello"));
            }
            other => return Err(format!("unexpected {:?}", other).into()),
        }
        Ok(())
    }

    #[test]
    fn missing_directory_fails_with_its_token() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let gone = PathAddress::local(&dir.path().join("gone"), Path::new("/"));
        let workers = Workers::spawn(engine(), 1);
        workers.submit(FetchTask::LoadListing {
            address: gone.clone(),
            token: FetchToken::new(7),
            force: true,
        });
        match workers.response_rx().recv_timeout(Duration::from_secs(2))? {
            FetchResponse::Failed {
                address,
                error,
                token,
            } => {
                assert_eq!(address, gone);
                assert_eq!(token, FetchToken::new(7));
                assert_eq!(error.kind(), ErrorKind::NotFound);
            }
            other => return Err(format!("unexpected {:?}", other).into()),
        }
        Ok(())
    }

    #[test]
    fn every_task_gets_exactly_one_response() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        for name in ["a", "b", "c"] {
            fs::create_dir(dir.path().join(name))?;
        }
        let root = PathAddress::local(dir.path(), Path::new("/"));
        let targets = [root.clone(), root.join("a"), root.join("b"), root.join("c")];

        let workers = Workers::spawn(engine(), 4);
        let mut rng = rng();
        let total = 50u64;
        for i in 0..total {
            let address = targets[rng.random_range(0..targets.len())].clone();
            workers.submit(FetchTask::LoadListing {
                address,
                token: FetchToken::new(i),
                force: rng.random_bool(0.3),
            });
        }

        let mut seen = HashSet::new();
        for _ in 0..total {
            let response = workers.response_rx().recv_timeout(Duration::from_secs(5))?;
            assert!(matches!(response, FetchResponse::ListingLoaded { .. }));
            assert!(seen.insert(response.token()), "duplicate {}", response.token());
        }
        assert_eq!(seen.len() as u64, total);
        Ok(())
    }

    #[test]
    fn tokens_increase() {
        let a = FetchToken::default();
        let b = a.next();
        assert!(b > a);
        assert_eq!(b.get(), 1);
        assert_eq!(b.to_string(), "#1");
    }
}
