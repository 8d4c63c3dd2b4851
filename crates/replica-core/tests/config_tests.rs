//! Tests for loading replicas.toml from disk

use std::fs;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use replica_core::{Error, FailureClass, ReplicaConfig, Replicas, SyncSettings, SyncStatus};
use replica_test_utils::{CountingPuller, ReplicaFixture, ScriptedConnector};
use tempfile::tempdir;

#[test]
fn missing_file_is_config_not_found() {
    let dir = tempdir().unwrap();
    let err = ReplicaConfig::load(&dir.path().join("replicas.toml")).unwrap_err();

    assert!(matches!(err, Error::ConfigNotFound { .. }), "{err}");
    assert_eq!(err.failure_class(), FailureClass::ConfigurationError);
}

#[test]
fn malformed_toml_names_the_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("replicas.toml");
    fs::write(&path, "[aliases.wcmkt2\npath = ").unwrap();

    let err = ReplicaConfig::load(&path).unwrap_err();
    match &err {
        Error::ConfigParse { path: reported, .. } => assert_eq!(reported, &path),
        other => panic!("expected ConfigParse, got {other:?}"),
    }
}

#[test]
fn out_of_range_stale_threshold_is_rejected_at_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("replicas.toml");
    fs::write(&path, "[sync]\nstale_after_minutes = 9223372036854775807\n").unwrap();

    let err = ReplicaConfig::load(&path).unwrap_err();
    assert!(matches!(err, Error::ConfigParse { .. }), "{err}");
    assert!(err.to_string().contains("stale_after_minutes"), "{err}");

    let err = Replicas::open(&path).unwrap_err();
    assert_eq!(err.failure_class(), FailureClass::ConfigurationError);
}

#[test]
fn out_of_range_stale_threshold_is_rejected_by_settings() {
    let fixture = ReplicaFixture::new("wcmkt2", "2025-03-01 12:00:00");
    let replicas = Replicas::new(
        fixture.catalog(),
        Arc::new(ScriptedConnector::new()),
        Arc::new(CountingPuller::new()),
    );
    let settings = SyncSettings {
        stale_after_minutes: i64::MAX,
        ..SyncSettings::default()
    };

    let err = replicas.with_settings(&settings).unwrap_err();
    assert!(matches!(err, Error::InvalidSetting { .. }), "{err}");
}

#[test]
fn relative_paths_resolve_against_config_dir() {
    let fixture = ReplicaFixture::new("wcmkt2", "2025-03-01 12:00:00");
    let path = fixture.write_config();

    let config = ReplicaConfig::load(&path).unwrap();
    let alias = config.catalog.resolve("wcmkt2").unwrap();

    assert_eq!(alias.local_path, fixture.local_path());
    assert_eq!(
        config.settings.state_file,
        fixture.root().join("state").join("last_sync_state.json")
    );
}

#[test]
fn token_can_come_from_environment() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("replicas.toml");
    // Unique name so parallel tests never race on it.
    let var = "REPLICA_CONFIG_TESTS_SDE_TOKEN";
    // SAFETY: no other test reads or writes this variable.
    unsafe { std::env::set_var(var, "from-env") };
    fs::write(
        &path,
        format!(
            r#"
            [aliases.sde]
            path = "sde.db"
            remote_url = "libsql://sde.example.turso.io"
            auth_token_env = "{var}"
            "#
        ),
    )
    .unwrap();

    let config = ReplicaConfig::load(&path).unwrap();
    let alias = config.catalog.resolve("sde").unwrap();
    assert_eq!(alias.credential.expose(), "from-env");
    assert!(!format!("{alias:?}").contains("from-env"));
}

#[test]
fn opened_replicas_sync_and_record_state() {
    let fixture = ReplicaFixture::new("wcmkt2", "2025-03-01 12:00:00");
    let replicas = Replicas::open(&fixture.write_config()).unwrap();

    let record = replicas.sync("wcmkt2").unwrap();
    assert_eq!(record.status(), SyncStatus::Healthy);

    let state = replicas.sync_state(record.completed_at).unwrap().unwrap();
    assert_eq!(
        state.last_sync.format("%Y-%m-%d %H:%M").to_string(),
        record.completed_at.format("%Y-%m-%d %H:%M").to_string()
    );
    assert!(fixture.root().join("state").join("last_sync_state.json").exists());
}
