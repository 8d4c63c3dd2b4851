//! Replica synchronization
//!
//! - **coordinator**: one exclusive pull-and-verify pass per call
//! - **record**: the outcome of a pass, for status reporting

mod coordinator;
mod record;

pub use coordinator::SyncCoordinator;
pub use record::{SyncRecord, SyncStatus};
