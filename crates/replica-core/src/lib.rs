//! Replica synchronization and concurrency control
//!
//! Several datasets ("aliases") each have a remote database and a local
//! file replica that reads are served from. This crate provides:
//!
//! - **Alias catalog**: alias to local file, remote endpoint and credential,
//!   with redirects for generic and retired names
//! - **Registry**: one reader/writer lock and one handle cache per alias
//! - **Sync**: exclusive pull-and-verify passes with integrity and freshness checks
//! - **Resilient reads**: resync-and-retry on local corruption, then remote fallback
//! - **Introspection**: table lists, columns and update-log staleness
//! - **Schedule**: the persisted two-hourly sync state
//!
//! # Architecture
//!
//! ```text
//!                 Replicas (consumer API)
//!                  /        |         \
//!     ResilientReader   Inspector   SyncStateStore
//!            |       \
//!            |   SyncCoordinator -- IntegrityChecker
//!            |       /
//!          Registry (locks + handles)
//!            |
//!     AliasCatalog   ReplicaLock   Connector / RemotePuller
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use replica_core::{Replicas, Result};
//!
//! fn example() -> Result<()> {
//!     let replicas = Replicas::open(Path::new("replicas.toml"))?;
//!     let rows = replicas.read("wcmkt", "SELECT COUNT(*) FROM marketstats", &[])?;
//!     println!("{:?}", rows.scalar());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod classify;
pub mod config;
pub mod error;
pub mod handle;
pub mod inspect;
pub mod integrity;
pub mod io;
pub mod lock;
pub mod reader;
pub mod registry;
pub mod remote;
pub mod replicas;
pub mod schedule;
pub mod sync;

pub use catalog::{AliasCatalog, AliasConfig, Credential, FreshnessMarker, Redirect, validate_identifier};
pub use classify::{FailureClass, classify_error, classify_local_error};
pub use config::{CatalogFile, DEFAULT_CONFIG_FILE, ReplicaConfig, SyncSettings};
pub use error::{DriverError, Error, Result};
pub use handle::{Connector, Handle, HandleKind, RowSet, SqliteConnector, SqliteHandle, Value};
pub use inspect::{ColumnInfo, Inspector, Source, TableUpdate};
pub use integrity::{FreshnessComparison, IntegrityChecker, IntegrityReport};
pub use lock::{ReadGuard, ReplicaLock, WriteGuard};
pub use reader::ResilientReader;
pub use registry::Registry;
pub use remote::{FileRemote, RemotePuller};
pub use replicas::{AccessMode, InitEntry, InitReport, InitStatus, LocalAccess, RefreshOutcome, Replicas};
pub use schedule::{SyncState, SyncStateStore, next_sync_after};
pub use sync::{SyncCoordinator, SyncRecord, SyncStatus};

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn error_config_not_found_displays_path() {
        let path = PathBuf::from("/etc/replicas/replicas.toml");
        let error = Error::ConfigNotFound { path };

        let display = error.to_string();
        assert!(
            display.contains("/etc/replicas/replicas.toml"),
            "Error display should contain the path, got: {}",
            display
        );
        assert_eq!(error.failure_class(), FailureClass::ConfigurationError);
    }
}
