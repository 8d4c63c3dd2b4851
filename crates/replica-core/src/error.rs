//! Error types for replica-core

use std::path::PathBuf;

use crate::classify::{FailureClass, classify_error, classify_local_error};
use crate::handle::HandleKind;

/// Result type for replica-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// An error reported by the underlying database driver.
///
/// The driver exposes no structured error codes we can rely on across
/// backends, so only the message text is kept. [`classify_error`] turns it
/// into a [`FailureClass`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DriverError {
    pub message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Classify this error by its message text.
    pub fn class(&self) -> FailureClass {
        classify_error(&self.message)
    }

    /// Classify this error as raised by a handle of `kind`.
    pub fn class_for(&self, kind: HandleKind) -> FailureClass {
        if kind.is_local() {
            classify_local_error(&self.message)
        } else {
            self.class()
        }
    }
}

impl From<rusqlite::Error> for DriverError {
    fn from(err: rusqlite::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Errors that can occur in replica-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Alias is neither configured nor redirected
    #[error("Unknown database alias '{alias}'. Available: {available:?}")]
    UnknownAlias {
        alias: String,
        available: Vec<String>,
    },

    /// Catalog file not found at expected path
    #[error("Configuration not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// Catalog file parsed but failed validation
    #[error("Invalid configuration in {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    /// Programmatic sync settings out of range
    #[error("Invalid setting '{setting}': {message}")]
    InvalidSetting { setting: String, message: String },

    /// A table or column name that cannot be safely embedded in SQL
    #[error("Invalid SQL identifier '{identifier}'")]
    InvalidIdentifier { identifier: String },

    /// Pulling remote state into the local replica failed
    #[error("Sync of '{alias}' from remote failed: {source}")]
    RemoteUnreachable {
        alias: String,
        #[source]
        source: DriverError,
    },

    /// A handle could not be created
    #[error("Failed to open {kind} handle for '{alias}': {source}")]
    HandleOpen {
        alias: String,
        kind: HandleKind,
        #[source]
        source: DriverError,
    },

    /// A query failed against a handle
    #[error("Query against {kind} handle for '{alias}' failed ({class}): {source}")]
    Query {
        alias: String,
        kind: HandleKind,
        class: FailureClass,
        #[source]
        source: DriverError,
    },

    /// A query returned a shape the caller could not interpret
    #[error("Unexpected result from '{alias}': {message}")]
    UnexpectedResult { alias: String, message: String },

    /// Sync state file could not be read or written
    #[error("Sync state error at {path}: {message}")]
    StateFile { path: PathBuf, message: String },

    /// Advisory file lock could not be taken
    #[error("Lock acquisition failed for {path}")]
    LockFailed { path: PathBuf },

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML deserialization error
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),
}

impl Error {
    /// Build a [`Error::Query`], classifying the driver message.
    pub fn query(alias: impl Into<String>, kind: HandleKind, source: DriverError) -> Self {
        Self::Query {
            alias: alias.into(),
            kind,
            class: source.class_for(kind),
            source,
        }
    }

    /// The failure class this error belongs to.
    ///
    /// Used by the resilient reader to decide between propagating, resyncing
    /// and falling back to the remote.
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::UnknownAlias { .. }
            | Self::ConfigNotFound { .. }
            | Self::ConfigParse { .. }
            | Self::InvalidSetting { .. }
            | Self::InvalidIdentifier { .. } => FailureClass::ConfigurationError,
            Self::RemoteUnreachable { .. } => FailureClass::RemoteUnreachable,
            Self::HandleOpen { kind, source, .. } => source.class_for(*kind),
            Self::Query { class, .. } => *class,
            Self::UnexpectedResult { .. }
            | Self::StateFile { .. }
            | Self::LockFailed { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::TomlDe(_) => FailureClass::Unclassified,
        }
    }

    /// Whether this error signals a damaged local replica file.
    pub fn is_corruption(&self) -> bool {
        self.failure_class() == FailureClass::CorruptedLocalReplica
    }
}
