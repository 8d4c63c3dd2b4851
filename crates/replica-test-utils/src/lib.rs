//! Shared test utilities for the replica workspace.
//!
//! Dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`fixture`]: real SQLite remote/local files in a temp directory
//! - [`scripted`]: fake handles, connectors and pullers with call counters

pub mod fixture;
pub mod scripted;

pub use fixture::{ReplicaFixture, write_garbage, write_market_db};
pub use scripted::{CountingPuller, MALFORMED, ScriptedConnector, ScriptedHandle, scalar};
