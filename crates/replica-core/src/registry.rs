//! Process-wide registry of per-alias locks and handles
//!
//! One `Registry` is built at startup and shared by reference with every
//! component that touches a replica. Locks and handles are keyed by the
//! canonical alias, so every caller naming the same dataset (directly or via
//! a redirect) gets the same instances.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::catalog::{AliasCatalog, AliasConfig};
use crate::handle::{Connector, Handle, HandleKind};
use crate::lock::ReplicaLock;
use crate::{Error, Result};

/// Cached handles for one alias.
#[derive(Debug, Default)]
struct HandleSet {
    handles: BTreeMap<HandleKind, Arc<dyn Handle>>,
}

fn lock_map<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared locks and lazily-opened handles for every alias.
pub struct Registry {
    catalog: Arc<AliasCatalog>,
    connector: Arc<dyn Connector>,
    locks: Mutex<HashMap<String, Arc<ReplicaLock>>>,
    handles: Mutex<HashMap<String, Arc<Mutex<HandleSet>>>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("aliases", &self.catalog.len())
            .finish_non_exhaustive()
    }
}

impl Registry {
    pub fn new(catalog: Arc<AliasCatalog>, connector: Arc<dyn Connector>) -> Self {
        Self {
            catalog,
            connector,
            locks: Mutex::new(HashMap::new()),
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &AliasCatalog {
        &self.catalog
    }

    /// Resolve `alias` through the catalog.
    pub fn config(&self, alias: &str) -> Result<Arc<AliasConfig>> {
        self.catalog.resolve(alias)
    }

    /// The shared lock for `alias`, created on first use.
    ///
    /// Repeated calls for the same dataset return the same instance.
    pub fn lock(&self, alias: &str) -> Result<Arc<ReplicaLock>> {
        let canonical = self.catalog.canonical_name(alias)?;
        let mut locks = lock_map(&self.locks);
        let lock = locks
            .entry(canonical.to_string())
            .or_insert_with(|| Arc::new(ReplicaLock::new()));
        Ok(Arc::clone(lock))
    }

    fn handle_set(&self, canonical: &str) -> Arc<Mutex<HandleSet>> {
        let mut handles = lock_map(&self.handles);
        Arc::clone(handles.entry(canonical.to_string()).or_default())
    }

    /// The shared handle of `kind` for `alias`, opened on first use.
    pub fn handle(&self, alias: &str, kind: HandleKind) -> Result<Arc<dyn Handle>> {
        let config = self.catalog.resolve(alias)?;
        let set = self.handle_set(&config.alias);
        let mut set = lock_map(&set);

        if let Some(handle) = set.handles.get(&kind) {
            return Ok(Arc::clone(handle));
        }

        let handle = self
            .connector
            .open(&config, kind)
            .map_err(|source| Error::HandleOpen {
                alias: config.alias.clone(),
                kind,
                source,
            })?;
        tracing::debug!(alias = %config.alias, %kind, "created handle");
        set.handles.insert(kind, Arc::clone(&handle));
        Ok(handle)
    }

    /// Number of cached handles for `alias`.
    pub fn cached_handles(&self, alias: &str) -> Result<usize> {
        let canonical = self.catalog.canonical_name(alias)?;
        let handles = lock_map(&self.handles);
        Ok(handles
            .get(canonical)
            .map(|set| lock_map(set).handles.len())
            .unwrap_or(0))
    }

    /// Close and forget every cached handle for `alias`.
    ///
    /// Disposal is best effort: close errors are logged and swallowed so an
    /// already-broken handle cannot block a sync.
    pub fn invalidate(&self, alias: &str) -> Result<()> {
        let canonical = self.catalog.canonical_name(alias)?;
        let set = lock_map(&self.handles).get(canonical).cloned();
        let Some(set) = set else {
            return Ok(());
        };

        let stale = std::mem::take(&mut lock_map(&set).handles);
        for (kind, handle) in stale {
            dispose(canonical, kind, handle.as_ref());
        }
        Ok(())
    }
}

fn dispose(alias: &str, kind: HandleKind, handle: &dyn Handle) {
    match handle.close() {
        Ok(()) => tracing::debug!(alias, %kind, "disposed handle"),
        Err(err) => tracing::warn!(alias, %kind, error = %err, "failed to dispose handle"),
    }
}
