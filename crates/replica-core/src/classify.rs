//! Failure classification for driver errors
//!
//! The drivers we sit on report failures as text only. Every rule that maps
//! an error message to a recovery policy lives here so it can be tested and
//! replaced as one unit.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a failed operation should be treated by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureClass {
    /// Contention that may clear on its own (busy/locked database)
    Transient,
    /// The local replica file is structurally damaged; resync may repair it
    CorruptedLocalReplica,
    /// Network or authentication failure talking to the remote
    RemoteUnreachable,
    /// Bad or missing configuration; never retried
    ConfigurationError,
    /// Anything else (bad SQL, missing tables, type errors)
    Unclassified,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transient => "transient",
            Self::CorruptedLocalReplica => "corrupted local replica",
            Self::RemoteUnreachable => "remote unreachable",
            Self::ConfigurationError => "configuration error",
            Self::Unclassified => "unclassified",
        };
        f.write_str(name)
    }
}

const CORRUPTION_SIGNATURES: &[&str] = &["malformed", "file is not a database"];

const TRANSIENT_SIGNATURES: &[&str] = &["database is locked", "database table is locked", "busy"];

const REMOTE_SIGNATURES: &[&str] = &[
    "remote unreachable",
    "connection refused",
    "connection reset",
    "timed out",
    "unauthorized",
    "authentication",
    "name resolution",
];

const CONFIGURATION_SIGNATURES: &[&str] = &["unknown database alias", "unsupported dialect"];

/// Reported when the local replica file is missing or cannot be opened.
const MISSING_LOCAL_SIGNATURES: &[&str] = &["unable to open database file"];

/// Map a driver error message to a [`FailureClass`].
///
/// Matching is case-insensitive substring search. Corruption is checked first
/// so that a damaged file reported alongside other noise still triggers a
/// resync.
pub fn classify_error(text: &str) -> FailureClass {
    let text = text.to_lowercase();
    let matches = |signatures: &[&str]| signatures.iter().any(|s| text.contains(s));

    if matches(CORRUPTION_SIGNATURES) {
        FailureClass::CorruptedLocalReplica
    } else if matches(TRANSIENT_SIGNATURES) {
        FailureClass::Transient
    } else if matches(REMOTE_SIGNATURES) {
        FailureClass::RemoteUnreachable
    } else if matches(CONFIGURATION_SIGNATURES) {
        FailureClass::ConfigurationError
    } else {
        FailureClass::Unclassified
    }
}

/// Like [`classify_error`], for failures on a handle to the local replica.
///
/// A local file that cannot be opened at all is repaired the same way as a
/// damaged one: by pulling a fresh copy.
pub fn classify_local_error(text: &str) -> FailureClass {
    let lower = text.to_lowercase();
    if MISSING_LOCAL_SIGNATURES.iter().any(|s| lower.contains(s)) {
        FailureClass::CorruptedLocalReplica
    } else {
        classify_error(text)
    }
}
