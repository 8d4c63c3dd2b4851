//! Resilient query execution against local replicas
//!
//! Reads run against the local primary handle under the alias's read lock.
//! A read that fails because the local file is damaged is repaired by a
//! resync and retried once; if the retry is damaged too, the query goes to
//! the remote directly. Every other failure is returned as is, since
//! resyncing does not help bad SQL or an unreachable network.

use std::sync::Arc;

use crate::handle::{HandleKind, RowSet, Value};
use crate::registry::Registry;
use crate::sync::SyncCoordinator;
use crate::{Error, Result};

/// Query façade used by every consumer of replica data.
#[derive(Debug, Clone)]
pub struct ResilientReader {
    registry: Arc<Registry>,
    coordinator: Arc<SyncCoordinator>,
}

impl ResilientReader {
    pub fn new(registry: Arc<Registry>, coordinator: Arc<SyncCoordinator>) -> Self {
        Self {
            registry,
            coordinator,
        }
    }

    /// Run `sql` against `alias`, recovering from local corruption.
    pub fn read(&self, alias: &str, sql: &str, params: &[Value]) -> Result<RowSet> {
        let config = self.registry.config(alias)?;
        let alias = config.alias.as_str();

        match self.read_local(alias, sql, params) {
            Err(err) if err.is_corruption() => {
                tracing::warn!(alias, error = %err, "local replica looks corrupted, resyncing");
            }
            other => return other,
        }

        if let Err(err) = self.coordinator.sync(alias) {
            tracing::error!(alias, error = %err, "resync after corruption failed");
        }

        match self.read_local(alias, sql, params) {
            Err(err) if err.is_corruption() => {
                tracing::warn!(alias, error = %err, "local replica still corrupted, reading from remote");
            }
            other => return other,
        }

        self.read_remote(alias, sql, params)
    }

    /// Run `sql` against the local primary handle under the read lock.
    pub fn read_local(&self, alias: &str, sql: &str, params: &[Value]) -> Result<RowSet> {
        let lock = self.registry.lock(alias)?;
        let _read = lock.read();
        let handle = self.registry.handle(alias, HandleKind::Primary)?;
        handle
            .query(sql, params)
            .map_err(|source| Error::query(alias, HandleKind::Primary, source))
    }

    /// Run `sql` against the remote handle, bypassing the local replica and
    /// its lock.
    pub fn read_remote(&self, alias: &str, sql: &str, params: &[Value]) -> Result<RowSet> {
        let handle = self.registry.handle(alias, HandleKind::Remote)?;
        handle.query(sql, params).map_err(|source| {
            tracing::error!(alias, error = %source, "remote read failed");
            Error::query(alias, HandleKind::Remote, source)
        })
    }
}
