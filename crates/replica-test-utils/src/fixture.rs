//! On-disk replica fixtures.
//!
//! A [`ReplicaFixture`] owns a temp directory holding a "remote" SQLite file
//! and the path where the local replica lives, so sync tests can run the
//! real [`SqliteConnector`](replica_core::SqliteConnector) and
//! [`FileRemote`](replica_core::FileRemote) end to end.

use std::fs;
use std::path::{Path, PathBuf};

use replica_core::{AliasCatalog, AliasConfig, Credential, FreshnessMarker};
use rusqlite::{Connection, params};
use tempfile::TempDir;

/// Tracking table used by fixtures.
pub const MARKET_TABLE: &str = "marketstats";

/// Freshness column used by fixtures.
pub const MARKET_COLUMN: &str = "last_update";

/// Create (or replace) a small market database at `path`.
///
/// `marketstats` gets three rows whose `last_update` is `last_update`, and
/// `updatelog` records one update of `marketstats` at the same time.
pub fn write_market_db(path: &Path, last_update: &str) {
    if path.exists() {
        fs::remove_file(path).unwrap();
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }

    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE marketstats (
             type_id INTEGER PRIMARY KEY,
             type_name TEXT NOT NULL,
             price REAL,
             last_update TEXT
         );
         CREATE TABLE updatelog (
             id INTEGER PRIMARY KEY,
             table_name TEXT NOT NULL,
             timestamp TEXT NOT NULL
         );",
    )
    .unwrap();
    for (id, name, price) in [(34, "Tritanium", 4.5), (35, "Pyerite", 9.25), (36, "Mexallon", 61.0)] {
        conn.execute(
            "INSERT INTO marketstats (type_id, type_name, price, last_update) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, price, last_update],
        )
        .unwrap();
    }
    conn.execute(
        "INSERT INTO updatelog (table_name, timestamp) VALUES ('marketstats', ?1)",
        params![last_update],
    )
    .unwrap();
}

/// Overwrite `path` with bytes that are not a SQLite database.
pub fn write_garbage(path: &Path) {
    fs::write(path, vec![0xA5u8; 8192]).unwrap();
}

/// `file://` endpoint for `path`.
pub fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Temp directory with a remote database and a local replica path.
pub struct ReplicaFixture {
    temp_dir: TempDir,
    alias: String,
}

impl ReplicaFixture {
    /// Create a fixture whose remote was last updated at `last_update`.
    /// The local replica does not exist yet.
    pub fn new(alias: &str, last_update: &str) -> Self {
        let fixture = Self {
            temp_dir: TempDir::new().unwrap(),
            alias: alias.to_string(),
        };
        write_market_db(&fixture.remote_path(), last_update);
        fixture
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn remote_path(&self) -> PathBuf {
        self.root().join("remote").join(format!("{}.db", self.alias))
    }

    pub fn local_path(&self) -> PathBuf {
        self.root().join("local").join(format!("{}.db", self.alias))
    }

    /// Update the remote database to `last_update`.
    pub fn set_remote(&self, last_update: &str) {
        write_market_db(&self.remote_path(), last_update);
    }

    /// Write a local replica directly, bypassing sync.
    pub fn set_local(&self, last_update: &str) {
        write_market_db(&self.local_path(), last_update);
    }

    pub fn corrupt_local(&self) {
        fs::create_dir_all(self.local_path().parent().unwrap()).unwrap();
        write_garbage(&self.local_path());
    }

    /// Alias config with a `file://` remote and the market freshness marker.
    pub fn config(&self) -> AliasConfig {
        AliasConfig::new(
            self.alias.clone(),
            self.local_path(),
            file_url(&self.remote_path()),
            Credential::new("test-token"),
        )
        .with_freshness(FreshnessMarker::new(MARKET_TABLE, MARKET_COLUMN).unwrap())
    }

    pub fn catalog(&self) -> AliasCatalog {
        AliasCatalog::new([self.config()])
    }

    /// Write a `replicas.toml` describing this fixture and return its path.
    ///
    /// The local path is written relative to the config file.
    pub fn write_config(&self) -> PathBuf {
        let content = format!(
            r#"[aliases.{alias}]
path = "local/{alias}.db"
remote_url = "{remote}"
auth_token = "test-token"

[aliases.{alias}.freshness]
table = "{table}"
column = "{column}"

[sync]
state_file = "state/last_sync_state.json"
"#,
            alias = self.alias,
            remote = file_url(&self.remote_path()),
            table = MARKET_TABLE,
            column = MARKET_COLUMN,
        );
        let path = self.root().join("replicas.toml");
        fs::write(&path, content).unwrap();
        path
    }
}
