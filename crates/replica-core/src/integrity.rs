//! Post-sync integrity and freshness checks
//!
//! These checks take no replica lock themselves. During a sync the
//! coordinator already holds the write lock; other callers go through
//! [`Replicas`](crate::Replicas), which takes the read lock first.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::handle::{HandleKind, Value};
use crate::registry::Registry;
use crate::{Error, Result};

const INTEGRITY_QUERY: &str = "PRAGMA integrity_check";

/// Token returned by a clean structural check.
const SUCCESS_TOKEN: &str = "ok";

/// Diagnostic phrase for free pages that nothing references. Reports made up
/// only of these lines are accepted as healthy.
const HARMLESS_DIAGNOSTIC: &str = "never used";

/// Outcome of a structural self-check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub healthy: bool,
    pub diagnostics: Vec<String>,
}

impl IntegrityReport {
    /// Interpret the lines returned by the structural check.
    pub fn from_diagnostics(diagnostics: Vec<String>) -> Self {
        let clean = matches!(diagnostics.as_slice(), [only] if only.trim() == SUCCESS_TOKEN);
        let only_harmless = !diagnostics.is_empty()
            && diagnostics.iter().all(|line| line.contains(HARMLESS_DIAGNOSTIC));

        Self {
            healthy: clean || only_harmless,
            diagnostics,
        }
    }
}

/// Freshness marker values read from both sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreshnessComparison {
    pub local: Value,
    pub remote: Value,
}

impl FreshnessComparison {
    pub fn in_sync(&self) -> bool {
        self.local.bit_eq(&self.remote)
    }
}

/// Runs structural and freshness checks against an alias's handles.
#[derive(Debug, Clone)]
pub struct IntegrityChecker {
    registry: Arc<Registry>,
}

impl IntegrityChecker {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Run the structural self-check and return the full report.
    pub fn inspect(&self, alias: &str) -> Result<IntegrityReport> {
        let config = self.registry.config(alias)?;
        let handle = self.registry.handle(&config.alias, HandleKind::Primary)?;
        let rows = handle
            .query(INTEGRITY_QUERY, &[])
            .map_err(|source| Error::query(&config.alias, HandleKind::Primary, source))?;

        let diagnostics = rows
            .rows
            .iter()
            .filter_map(|row| row.first())
            .map(|value| value.to_string())
            .collect();

        Ok(IntegrityReport::from_diagnostics(diagnostics))
    }

    /// Whether the local replica passes its structural self-check.
    ///
    /// A check that cannot even run counts as a failure.
    pub fn integrity_check(&self, alias: &str) -> bool {
        match self.inspect(alias) {
            Ok(report) if report.healthy => {
                if report.diagnostics != [SUCCESS_TOKEN] {
                    tracing::warn!(
                        alias,
                        diagnostics = ?report.diagnostics,
                        "integrity check reported only unused pages, treating as healthy"
                    );
                }
                true
            }
            Ok(report) => {
                tracing::error!(alias, diagnostics = ?report.diagnostics, "integrity check failed");
                false
            }
            Err(err) => {
                tracing::error!(alias, error = %err, "integrity check could not run");
                false
            }
        }
    }

    /// Read the freshness marker from the local and remote handles.
    ///
    /// Returns `Ok(None)` for aliases without a freshness marker.
    pub fn compare_freshness(&self, alias: &str) -> Result<Option<FreshnessComparison>> {
        let config = self.registry.config(alias)?;
        let Some(marker) = config.freshness.as_ref() else {
            return Ok(None);
        };
        let sql = marker.query();

        let read_marker = |kind: HandleKind| -> Result<Value> {
            let handle = self.registry.handle(&config.alias, kind)?;
            let rows = handle
                .query(&sql, &[])
                .map_err(|source| Error::query(&config.alias, kind, source))?;
            Ok(rows.scalar().cloned().unwrap_or(Value::Null))
        };

        let remote = read_marker(HandleKind::Remote)?;
        let local = read_marker(HandleKind::Primary)?;
        tracing::info!(alias = %config.alias, %remote, %local, "compared freshness markers");

        Ok(Some(FreshnessComparison { local, remote }))
    }

    /// Whether local and remote freshness markers are identical.
    ///
    /// Aliases without a marker are reported as in sync.
    pub fn validate_sync(&self, alias: &str) -> Result<bool> {
        let in_sync = self
            .compare_freshness(alias)?
            .is_none_or(|comparison| comparison.in_sync());
        tracing::info!(alias, in_sync, "validated sync");
        Ok(in_sync)
    }
}
