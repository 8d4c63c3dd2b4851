//! SyncCoordinator implementation
//!
//! One sync pass: take the alias's write lock, take the global sync gate,
//! drop cached handles, pull, verify, release.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;

use crate::integrity::IntegrityChecker;
use crate::registry::Registry;
use crate::remote::RemotePuller;
use crate::{Error, Result};

use super::record::SyncRecord;

/// Runs sync passes for any alias.
///
/// Passes for the same alias are exclusive through the alias's write lock;
/// passes for different aliases are additionally serialized by a global
/// gate to bound concurrent disk I/O.
pub struct SyncCoordinator {
    registry: Arc<Registry>,
    checker: IntegrityChecker,
    puller: Arc<dyn RemotePuller>,
    gate: Mutex<()>,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl SyncCoordinator {
    pub fn new(registry: Arc<Registry>, puller: Arc<dyn RemotePuller>) -> Self {
        let checker = IntegrityChecker::new(Arc::clone(&registry));
        Self {
            registry,
            checker,
            puller,
            gate: Mutex::new(()),
        }
    }

    pub fn checker(&self) -> &IntegrityChecker {
        &self.checker
    }

    /// Synchronize `alias` from its remote.
    ///
    /// Pull failures are returned as [`Error::RemoteUnreachable`] after both
    /// locks are released. Integrity and freshness failures are recorded in
    /// the returned [`SyncRecord`] instead.
    pub fn sync(&self, alias: &str) -> Result<SyncRecord> {
        let config = self.registry.config(alias)?;
        let alias = config.alias.as_str();
        let lock = self.registry.lock(alias)?;

        tracing::debug!(alias, "waiting for write lock");
        let _write = lock.write();
        // Declared after the write guard so it is released first.
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);

        self.registry.invalidate(alias)?;

        tracing::info!(alias, "syncing database");
        self.puller
            .pull(&config)
            .map_err(|source| {
                tracing::error!(alias, error = %source, "pull from remote failed");
                Error::RemoteUnreachable {
                    alias: alias.to_string(),
                    source,
                }
            })?;
        let completed_at = Utc::now();
        tracing::info!(alias, %completed_at, "database synced");

        let integrity_ok = self.checker.integrity_check(alias);
        let freshness_ok = if integrity_ok && config.is_freshness_tracked() {
            match self.checker.validate_sync(alias) {
                Ok(in_sync) => Some(in_sync),
                Err(err) => {
                    tracing::warn!(alias, error = %err, "could not validate freshness");
                    None
                }
            }
        } else {
            None
        };

        let record = SyncRecord {
            alias: alias.to_string(),
            completed_at,
            integrity_ok,
            freshness_ok,
        };
        tracing::info!(alias, status = ?record.status(), "sync pass finished");
        Ok(record)
    }
}
