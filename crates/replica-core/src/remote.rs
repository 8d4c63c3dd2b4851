//! Pulling remote state into a local replica
//!
//! The exchange with the remote is opaque to the rest of the crate: a
//! [`RemotePuller`] either brings the local file up to date or fails.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, DatabaseName};

use crate::catalog::AliasConfig;
use crate::error::DriverError;
use crate::handle::file_endpoint;

/// Fetches the latest remote state into the alias's local file.
pub trait RemotePuller: Send + Sync {
    fn pull(&self, config: &AliasConfig) -> Result<(), DriverError>;
}

/// Puller for `file://` remotes.
///
/// Copies the remote database with the SQLite online-backup API into a temp
/// file beside the local replica, then renames it over the replica so readers
/// never see a half-written file.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileRemote;

impl FileRemote {
    pub fn new() -> Self {
        Self
    }
}

fn temp_path_for(local: &Path) -> PathBuf {
    let temp_name = format!(
        ".{}.{}.sync",
        local
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default(),
        std::process::id()
    );
    local.with_file_name(temp_name)
}

impl RemotePuller for FileRemote {
    fn pull(&self, config: &AliasConfig) -> Result<(), DriverError> {
        let remote = file_endpoint(&config.remote_endpoint).ok_or_else(|| {
            DriverError::new(format!(
                "remote unreachable: no puller for endpoint '{}'",
                config.remote_endpoint
            ))
        })?;
        if !remote.is_file() {
            return Err(DriverError::new(format!(
                "remote unreachable: {} does not exist",
                remote.display()
            )));
        }

        let local = config.local_path();
        if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| DriverError::new(e.to_string()))?;
        }

        let temp_path = temp_path_for(local);
        let copied = (|| -> Result<(), DriverError> {
            let mut temp = Connection::open(&temp_path)?;
            temp.restore(
                DatabaseName::Main,
                &remote,
                None::<fn(rusqlite::backup::Progress)>,
            )?;
            temp.close().map_err(|(_, err)| DriverError::from(err))?;
            fs::rename(&temp_path, local).map_err(|e| DriverError::new(e.to_string()))
        })();

        if copied.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        copied?;

        tracing::debug!(
            alias = %config.alias,
            remote = %remote.display(),
            local = %local.display(),
            "pulled remote replica"
        );
        Ok(())
    }
}
