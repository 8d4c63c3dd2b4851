//! Replica Manager CLI
//!
//! Operator commands for syncing, checking and inspecting local replicas.

mod cli;
mod commands;
mod error;

use clap::Parser;
use colored::Colorize;
use replica_core::Replicas;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cli::{Cli, Commands};
use error::{CliError, Result};

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) -> Result<()> {
    let builder = FmtSubscriber::builder().with_writer(std::io::stderr);
    let result = if verbose {
        tracing::subscriber::set_global_default(
            builder.with_max_level(Level::DEBUG).with_target(true).finish(),
        )
    } else {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish())
    };
    result.map_err(|e| CliError::user(format!("Failed to set tracing subscriber: {e}")))
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose)?;
    tracing::debug!(config = %cli.config.display(), "Verbose mode enabled");

    match cli.command {
        Some(cmd) => {
            let replicas = Replicas::open(&cli.config)?;
            execute_command(&replicas, cmd)
        }
        None => {
            // No command provided - show help hint
            println!("{} Replica Manager CLI", "replica".green().bold());
            println!();
            println!("Run {} for available commands.", "replica --help".cyan());
            Ok(())
        }
    }
}

fn execute_command(replicas: &Replicas, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Sync { alias, json } => commands::run_sync(replicas, &alias, json),
        Commands::Check { alias } => commands::run_check(replicas, &alias),
        Commands::Init { json } => commands::run_init(replicas, json),
        Commands::Query {
            alias,
            sql,
            params,
            remote,
            json,
        } => commands::run_query(replicas, &alias, &sql, &params, remote, json),
        Commands::Tables { alias, remote } => commands::run_tables(replicas, &alias, remote),
        Commands::Columns {
            alias,
            table,
            remote,
        } => commands::run_columns(replicas, &alias, &table, remote),
        Commands::Status {
            alias,
            tables,
            json,
        } => commands::run_status(replicas, &alias, &tables, json),
    }
}
