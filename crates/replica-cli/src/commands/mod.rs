//! Command implementations for replica-cli

pub mod query;
pub mod status;
pub mod sync;

pub use query::{run_columns, run_query, run_tables};
pub use status::run_status;
pub use sync::{run_check, run_init, run_sync};
