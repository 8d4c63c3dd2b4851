//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use replica_core::DEFAULT_CONFIG_FILE;

/// Replica Manager - Sync and inspect local database replicas
#[derive(Parser, Debug)]
#[command(name = "replica")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the replica catalog
    #[arg(
        short,
        long,
        global = true,
        env = "REPLICA_CONFIG",
        default_value = DEFAULT_CONFIG_FILE
    )]
    pub config: PathBuf,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Pull the latest remote state into a local replica
    ///
    /// Examples:
    ///   replica sync wcmkt           # Sync the market replica
    ///   replica sync wcmkt --json    # Print the sync record as JSON
    Sync {
        /// Alias to sync
        alias: String,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Sync a replica only if it is behind its remote
    Check {
        /// Alias to check
        alias: String,
    },

    /// Sync every replica whose local file is missing
    Init {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Run a read query against a replica
    ///
    /// Examples:
    ///   replica query wcmkt "SELECT COUNT(*) FROM marketstats"
    ///   replica query wcmkt "SELECT * FROM marketstats WHERE type_id = ?1" -p 34
    Query {
        /// Alias to query
        alias: String,

        /// SQL to run
        sql: String,

        /// Positional parameters, bound as text
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Query the remote instead of the local replica
        #[arg(long)]
        remote: bool,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// List the tables of a replica
    Tables {
        /// Alias to inspect
        alias: String,

        /// Inspect the remote instead of the local replica
        #[arg(long)]
        remote: bool,
    },

    /// Describe the columns of a table
    Columns {
        /// Alias to inspect
        alias: String,

        /// Table to describe
        table: String,

        /// Inspect the remote instead of the local replica
        #[arg(long)]
        remote: bool,
    },

    /// Show table update times and the sync schedule
    Status {
        /// Alias to report on
        alias: String,

        /// Tables to report (default: every table except the update log)
        #[arg(short, long = "table")]
        tables: Vec<String>,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },
}
