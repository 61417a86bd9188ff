//! Backend client registry.
//!
//! One live client per `(scheme, authority)`, created lazily on first use and shared by every
//! worker. The registry is an explicit object owned by the engine: created at session start,
//! torn down with [BackendRegistry::shutdown] at session end.

use crate::core::address::{PathAddress, Scheme};
use crate::core::backend::{
    BackendClient, BackendOptions, CodeHostBackend, LocalBackend, ObjectStoreBackend,
    RemoteShellBackend,
};
use crate::core::error::Result;

use std::collections::HashMap;
use std::env;
use std::sync::{Arc, Mutex, MutexGuard};

/// Where credentials come from. Looked up by variable name (`AWS_ACCESS_KEY_ID`, ...).
pub trait CredentialSource: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

/// Reads credentials from the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn get(&self, name: &str) -> Option<String> {
        env::var(name).ok().filter(|v| !v.is_empty())
    }
}

/// Fixed credentials, for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct MapCredentials(HashMap<String, String>);

impl MapCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }
}

impl CredentialSource for MapCredentials {
    fn get(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }
}

/// Builds a client for an address. Swappable so tests can hand out fakes.
pub type BackendFactory =
    dyn Fn(&PathAddress, &dyn CredentialSource) -> Result<BackendClient> + Send + Sync;

type ClientKey = (Scheme, String);

pub struct BackendRegistry {
    clients: Mutex<HashMap<ClientKey, BackendClient>>,
    credentials: Arc<dyn CredentialSource>,
    factory: Box<BackendFactory>,
}

impl BackendRegistry {
    /// Registry using the built-in adapters.
    pub fn new(options: BackendOptions, credentials: Arc<dyn CredentialSource>) -> Self {
        let factory = move |addr: &PathAddress, creds: &dyn CredentialSource| {
            default_client(addr, creds, &options)
        };
        Self::with_factory(credentials, factory)
    }

    pub fn with_factory<F>(credentials: Arc<dyn CredentialSource>, factory: F) -> Self
    where
        F: Fn(&PathAddress, &dyn CredentialSource) -> Result<BackendClient> + Send + Sync + 'static,
    {
        Self {
            clients: Mutex::new(HashMap::new()),
            credentials,
            factory: Box::new(factory),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ClientKey, BackendClient>> {
        // a panicked worker must not take the registry down with it
        self.clients.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Client serving `addr`, constructed on first use.
    ///
    /// Construction failures (bad endpoint, missing `ssh` binary) are returned for this
    /// address only and nothing is cached, so a later call retries construction.
    pub fn client(&self, addr: &PathAddress) -> Result<BackendClient> {
        let key = addr.client_key();
        let mut clients = self.lock();
        if let Some(client) = clients.get(&key) {
            return Ok(Arc::clone(client));
        }

        let client = (self.factory)(addr, self.credentials.as_ref())?;
        tracing::debug!(scheme = %key.0, authority = %key.1, "created backend client");
        clients.insert(key, Arc::clone(&client));
        Ok(client)
    }

    /// Drops the client serving `addr`; the next call builds a fresh one.
    pub fn invalidate(&self, addr: &PathAddress) {
        let removed = self.lock().remove(&addr.client_key());
        if let Some(client) = removed {
            tracing::warn!(client = client.label(), "invalidated backend client");
            client.shutdown();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn shutdown(&self) {
        let drained: Vec<BackendClient> = self.lock().drain().map(|(_, c)| c).collect();
        for client in drained {
            client.shutdown();
        }
    }
}

impl Drop for BackendRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn default_client(
    addr: &PathAddress,
    creds: &dyn CredentialSource,
    options: &BackendOptions,
) -> Result<BackendClient> {
    let client: BackendClient = match addr.scheme() {
        Scheme::Local => Arc::new(LocalBackend::new()),
        Scheme::ObjectStore => Arc::new(ObjectStoreBackend::new(
            addr.authority(),
            &options.object_store,
            creds,
            options.timeout,
            options.retry,
        )?),
        Scheme::CodeHost => Arc::new(CodeHostBackend::new(
            addr.authority(),
            &options.code_host,
            creds,
            options.timeout,
            options.retry,
        )?),
        Scheme::RemoteShell => Arc::new(RemoteShellBackend::new(
            addr.authority(),
            &options.remote_shell,
            options.timeout,
        )?),
    };
    Ok(client)
}
