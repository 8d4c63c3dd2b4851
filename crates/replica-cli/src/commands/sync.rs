//! Sync, check, and init command implementations
//!
//! These commands pull remote state into local replicas.

use colored::Colorize;
use replica_core::{InitStatus, RefreshOutcome, Replicas, SyncRecord, SyncStatus};

use crate::error::{CliError, Result};

/// Status tag and summary for a sync record.
fn describe(record: &SyncRecord) -> (colored::ColoredString, &'static str) {
    match record.status() {
        SyncStatus::Healthy => ("OK".green().bold(), "integrity ok, freshness markers match"),
        SyncStatus::Unverified => ("OK".green().bold(), "integrity ok, freshness not verified"),
        SyncStatus::FreshnessMismatch => (
            "STALE".yellow().bold(),
            "integrity ok, local marker differs from remote",
        ),
        SyncStatus::IntegrityDegraded => {
            ("DEGRADED".red().bold(), "integrity check failed after sync")
        }
    }
}

pub(crate) fn print_record(record: &SyncRecord) {
    let (tag, summary) = describe(record);
    println!(
        "{} {} synced at {} ({})",
        tag,
        record.alias.cyan(),
        record.completed_at.format("%Y-%m-%d %H:%M:%S UTC"),
        summary
    );
}

/// Run the sync command
pub fn run_sync(replicas: &Replicas, alias: &str, json: bool) -> Result<()> {
    if !json {
        println!("{} Syncing {}...", "=>".blue().bold(), alias.cyan());
    }

    let record = replicas.sync(alias)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_record(&record);
    }
    Ok(())
}

/// Run the check command
///
/// Syncs only when the local freshness marker differs from the remote's.
pub fn run_check(replicas: &Replicas, alias: &str) -> Result<()> {
    println!("{} Checking {}...", "=>".blue().bold(), alias.cyan());

    match replicas.refresh_if_stale(alias)? {
        RefreshOutcome::UpToDate => {
            println!("{} {} is up to date.", "OK".green().bold(), alias.cyan());
        }
        RefreshOutcome::Synced(record) => print_record(&record),
        RefreshOutcome::Untracked => {
            println!(
                "{} {} has no freshness marker; run {} to force a sync.",
                "SKIP".yellow().bold(),
                alias.cyan(),
                format!("replica sync {alias}").cyan()
            );
        }
    }
    Ok(())
}

/// Run the init command
pub fn run_init(replicas: &Replicas, json: bool) -> Result<()> {
    if !json {
        println!("{} Initializing replicas...", "=>".blue().bold());
    }

    let report = replicas.initialize();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for entry in &report.entries {
            match &entry.status {
                InitStatus::Present => {
                    println!("{} {} already present", "OK".green().bold(), entry.alias.cyan());
                }
                InitStatus::Synced(record) => print_record(record),
                InitStatus::Failed(message) => {
                    println!("{} {}: {}", "FAILED".red().bold(), entry.alias.cyan(), message);
                }
            }
        }
    }

    let failed = report.failures().count();
    if failed > 0 {
        return Err(CliError::user(format!(
            "{failed} replica(s) failed to initialize"
        )));
    }
    Ok(())
}
