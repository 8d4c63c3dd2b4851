//! Status command implementation

use chrono::Utc;
use colored::Colorize;
use replica_core::{Replicas, Source};

use crate::error::Result;

/// Run the status command
pub fn run_status(replicas: &Replicas, alias: &str, tables: &[String], json: bool) -> Result<()> {
    let inspector = replicas.inspector();
    let tables: Vec<String> = if tables.is_empty() {
        inspector
            .table_list(alias, Source::Local)?
            .into_iter()
            .filter(|table| table != inspector.update_log_table())
            .collect()
    } else {
        tables.to_vec()
    };
    let names: Vec<&str> = tables.iter().map(String::as_str).collect();

    let now = Utc::now();
    let updates = inspector.update_status(alias, &names, Source::Local, now)?;
    let schedule = replicas.sync_state(now)?;

    if json {
        let value = serde_json::json!({
            "alias": alias,
            "tables": updates,
            "schedule": schedule,
            "next_sync_in": schedule.as_ref().map(|state| state.describe_until(now)),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", "Replica Status".bold());
    println!();
    println!("{}:  {}", "Alias".dimmed(), alias.cyan());
    println!();

    println!("{}:", "Tables".bold());
    if updates.is_empty() {
        println!("  {}", "None".dimmed());
    }
    for (table, update) in &updates {
        let updated = update
            .updated
            .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        let state = if update.needs_update {
            "needs update".yellow()
        } else {
            "ok".green()
        };
        println!(
            "  {} {} {} ({})",
            "+".green(),
            table.cyan(),
            updated.dimmed(),
            state
        );
    }
    println!();

    println!("{}:", "Schedule".bold());
    match schedule {
        Some(state) => {
            println!(
                "  {}:  {}",
                "Last sync".dimmed(),
                state.last_sync.format("%Y-%m-%d %H:%M UTC")
            );
            println!(
                "  {}:  {}",
                "Next sync".dimmed(),
                state.next_sync.format("%Y-%m-%d %H:%M UTC")
            );
            let until = state.describe_until(now);
            if state.is_due(now) {
                println!("  {}", until.yellow());
            } else {
                println!("  {} {}", "in".dimmed(), until);
            }
        }
        None => println!("  {}", "No state file configured".dimmed()),
    }

    Ok(())
}
