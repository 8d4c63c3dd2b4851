//! Result of one sync pass

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Overall health of a completed sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    /// Integrity passed and freshness markers match
    Healthy,
    /// Integrity passed; the alias has no freshness marker or it could not be read
    Unverified,
    /// Integrity passed but local and remote markers differ
    FreshnessMismatch,
    /// The structural self-check failed after the pull
    IntegrityDegraded,
}

/// Transient record of one sync pass, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub alias: String,
    pub completed_at: DateTime<Utc>,
    pub integrity_ok: bool,
    /// `None` when freshness was not checked or could not be determined.
    pub freshness_ok: Option<bool>,
}

impl SyncRecord {
    pub fn status(&self) -> SyncStatus {
        match (self.integrity_ok, self.freshness_ok) {
            (false, _) => SyncStatus::IntegrityDegraded,
            (true, Some(true)) => SyncStatus::Healthy,
            (true, Some(false)) => SyncStatus::FreshnessMismatch,
            (true, None) => SyncStatus::Unverified,
        }
    }

    /// Whether the dashboard should show a success banner.
    pub fn is_success(&self) -> bool {
        matches!(self.status(), SyncStatus::Healthy | SyncStatus::Unverified)
    }
}
