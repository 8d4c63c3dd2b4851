//! Consumer entry point
//!
//! [`Replicas`] wires the registry, sync coordinator, resilient reader and
//! inspector together once per process and exposes the operations business
//! code and the CLI use.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::AliasCatalog;
use crate::config::{ReplicaConfig, SyncSettings};
use crate::handle::{Connector, Handle, HandleKind, RowSet, SqliteConnector, Value};
use crate::inspect::Inspector;
use crate::integrity::{FreshnessComparison, IntegrityChecker};
use crate::lock::ReplicaLock;
use crate::reader::ResilientReader;
use crate::registry::Registry;
use crate::remote::{FileRemote, RemotePuller};
use crate::schedule::{SyncState, SyncStateStore};
use crate::sync::{SyncCoordinator, SyncRecord};
use crate::{Error, Result};

/// Lock mode for [`Replicas::local_access`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    #[default]
    Read,
    Write,
}

/// A held read or write permit on one alias's local file, plus the handle
/// to use under it. The permit is released on drop.
#[must_use = "the permit is released as soon as the access is dropped"]
pub struct LocalAccess {
    alias: String,
    mode: AccessMode,
    lock: Arc<ReplicaLock>,
    handle: Arc<dyn Handle>,
}

impl std::fmt::Debug for LocalAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAccess")
            .field("alias", &self.alias)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl LocalAccess {
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn handle(&self) -> &Arc<dyn Handle> {
        &self.handle
    }

    /// Run `sql` on the local handle under the held permit.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<RowSet> {
        self.handle
            .query(sql, params)
            .map_err(|source| Error::query(&self.alias, self.handle.kind(), source))
    }
}

impl Drop for LocalAccess {
    fn drop(&mut self) {
        match self.mode {
            AccessMode::Read => self.lock.release_read(),
            AccessMode::Write => self.lock.release_write(),
        }
    }
}

/// Result of [`Replicas::refresh_if_stale`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshOutcome {
    /// Local and remote freshness markers match
    UpToDate,
    /// Markers differed (or the local file was unreadable) and a sync ran
    Synced(SyncRecord),
    /// The alias has no freshness marker
    Untracked,
}

/// Per-alias result of [`Replicas::initialize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitStatus {
    Present,
    Synced(SyncRecord),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitEntry {
    pub alias: String,
    pub status: InitStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitReport {
    pub entries: Vec<InitEntry>,
}

impl InitReport {
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn failures(&self) -> impl Iterator<Item = &InitEntry> {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.status, InitStatus::Failed(_)))
    }
}

/// Process-wide replica access.
#[derive(Debug, Clone)]
pub struct Replicas {
    registry: Arc<Registry>,
    coordinator: Arc<SyncCoordinator>,
    reader: ResilientReader,
    inspector: Inspector,
    state: Option<SyncStateStore>,
}

impl Replicas {
    pub fn new(
        catalog: AliasCatalog,
        connector: Arc<dyn Connector>,
        puller: Arc<dyn RemotePuller>,
    ) -> Self {
        let registry = Arc::new(Registry::new(Arc::new(catalog), connector));
        let coordinator = Arc::new(SyncCoordinator::new(Arc::clone(&registry), puller));
        let reader = ResilientReader::new(Arc::clone(&registry), Arc::clone(&coordinator));
        let inspector = Inspector::new(reader.clone());
        Self {
            registry,
            coordinator,
            reader,
            inspector,
            state: None,
        }
    }

    /// Build from a loaded config using the SQLite connector and file remote.
    pub fn from_config(config: ReplicaConfig) -> Result<Self> {
        Self::new(
            config.catalog,
            Arc::new(SqliteConnector::new()),
            Arc::new(FileRemote::new()),
        )
        .with_settings(&config.settings)
    }

    /// Load the catalog at `path` and build from it.
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_config(ReplicaConfig::load(path)?)
    }

    /// Apply update-log, staleness and state-file settings.
    pub fn with_settings(mut self, settings: &SyncSettings) -> Result<Self> {
        let stale_after = settings.stale_after().ok_or_else(|| Error::InvalidSetting {
            setting: "stale_after_minutes".to_string(),
            message: format!(
                "must be a positive number of minutes, got {}",
                settings.stale_after_minutes
            ),
        })?;
        self.inspector = self
            .inspector
            .with_update_log_table(settings.update_log_table.clone())?
            .with_stale_after(stale_after);
        self.state = Some(SyncStateStore::new(settings.state_file.clone()));
        Ok(self)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn catalog(&self) -> &AliasCatalog {
        self.registry.catalog()
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    pub fn checker(&self) -> &IntegrityChecker {
        self.coordinator.checker()
    }

    pub fn reader(&self) -> &ResilientReader {
        &self.reader
    }

    pub fn inspector(&self) -> &Inspector {
        &self.inspector
    }

    /// Resilient read against the local replica.
    pub fn read(&self, alias: &str, sql: &str, params: &[Value]) -> Result<RowSet> {
        self.reader.read(alias, sql, params)
    }

    /// Read straight from the remote.
    pub fn read_remote(&self, alias: &str, sql: &str, params: &[Value]) -> Result<RowSet> {
        let config = self.registry.config(alias)?;
        self.reader.read_remote(&config.alias, sql, params)
    }

    /// Run one sync pass, recording completion in the state store if one is
    /// configured.
    pub fn sync(&self, alias: &str) -> Result<SyncRecord> {
        let record = self.coordinator.sync(alias)?;
        if let Some(store) = &self.state {
            if let Err(err) = store.record_sync(record.completed_at, Utc::now()) {
                tracing::warn!(alias = %record.alias, error = %err, "could not record sync state");
            }
        }
        Ok(record)
    }

    /// Hold the read or write permit for `alias` while working on its local
    /// file directly.
    ///
    /// Read access uses the read-only handle, write access the primary one.
    pub fn local_access(&self, alias: &str, mode: AccessMode) -> Result<LocalAccess> {
        let config = self.registry.config(alias)?;
        let alias = config.alias.as_str();
        let lock = self.registry.lock(alias)?;

        let kind = match mode {
            AccessMode::Read => {
                lock.acquire_read();
                HandleKind::ReadOnly
            }
            AccessMode::Write => {
                lock.acquire_write();
                HandleKind::Primary
            }
        };

        match self.registry.handle(alias, kind) {
            Ok(handle) => Ok(LocalAccess {
                alias: alias.to_string(),
                mode,
                lock,
                handle,
            }),
            Err(err) => {
                match mode {
                    AccessMode::Read => lock.release_read(),
                    AccessMode::Write => lock.release_write(),
                }
                Err(err)
            }
        }
    }

    /// Compare remote and local freshness markers under the read lock.
    ///
    /// `None` for aliases without a marker.
    pub fn check_freshness(&self, alias: &str) -> Result<Option<FreshnessComparison>> {
        let config = self.registry.config(alias)?;
        let lock = self.registry.lock(&config.alias)?;
        let _read = lock.read();
        self.checker().compare_freshness(&config.alias)
    }

    /// Sync `alias` if its local freshness marker differs from the remote's.
    ///
    /// A local file too damaged to read its marker is synced as well.
    pub fn refresh_if_stale(&self, alias: &str) -> Result<RefreshOutcome> {
        let config = self.registry.config(alias)?;
        let alias = config.alias.as_str();

        match self.check_freshness(alias) {
            Ok(None) => Ok(RefreshOutcome::Untracked),
            Ok(Some(comparison)) if comparison.in_sync() => {
                tracing::debug!(alias, "local replica is up to date");
                Ok(RefreshOutcome::UpToDate)
            }
            Ok(Some(comparison)) => {
                tracing::info!(
                    alias,
                    local = %comparison.local,
                    remote = %comparison.remote,
                    "local replica is stale, syncing"
                );
                self.sync(alias).map(RefreshOutcome::Synced)
            }
            Err(err) if err.is_corruption() => {
                tracing::warn!(alias, error = %err, "local replica unreadable, syncing");
                self.sync(alias).map(RefreshOutcome::Synced)
            }
            Err(err) => Err(err),
        }
    }

    /// Sync every alias whose local file does not exist yet.
    pub fn initialize(&self) -> InitReport {
        let aliases: Vec<_> = self.catalog().aliases().cloned().collect();
        let mut report = InitReport::default();

        for config in aliases {
            let status = if config.local_path().exists() {
                tracing::debug!(alias = %config.alias, "local replica present");
                InitStatus::Present
            } else {
                tracing::info!(
                    alias = %config.alias,
                    path = %config.local_path().display(),
                    "local replica missing, syncing"
                );
                match self.sync(&config.alias) {
                    Ok(record) => InitStatus::Synced(record),
                    Err(err) => {
                        tracing::error!(alias = %config.alias, error = %err, "initial sync failed");
                        InitStatus::Failed(err.to_string())
                    }
                }
            };
            report.entries.push(InitEntry {
                alias: config.alias.clone(),
                status,
            });
        }

        report
    }

    /// Schedule state as of `now`, if a state store is configured.
    pub fn sync_state(&self, now: DateTime<Utc>) -> Result<Option<SyncState>> {
        self.state.as_ref().map(|store| store.status(now)).transpose()
    }
}
