//! Tests for the Replicas entry point: scoped access, refresh and init

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use pretty_assertions::assert_eq;
use replica_core::{
    AccessMode, AliasCatalog, AliasConfig, Credential, FileRemote, HandleKind, InitStatus,
    RefreshOutcome, Replicas, SqliteConnector, SyncStatus, Value,
};
use replica_test_utils::fixture::file_url;
use replica_test_utils::{CountingPuller, ReplicaFixture, ScriptedConnector};

fn sqlite_replicas(catalog: AliasCatalog) -> Replicas {
    Replicas::new(
        catalog,
        Arc::new(SqliteConnector::new()),
        Arc::new(FileRemote::new()),
    )
}

fn scripted_replicas() -> (Replicas, Arc<ScriptedConnector>) {
    let catalog = AliasCatalog::new([AliasConfig::new(
        "wcmkt2",
        "wcmkt2.db",
        "libsql://remote",
        Credential::default(),
    )])
    .with_redirect("wcmkt", "wcmkt2", false);
    let connector = Arc::new(ScriptedConnector::new());
    let replicas = Replicas::new(catalog, connector.clone(), Arc::new(CountingPuller::new()));
    (replicas, connector)
}

#[test]
fn read_access_uses_read_only_handle_and_counts_as_reader() {
    let (replicas, connector) = scripted_replicas();
    let lock = replicas.registry().lock("wcmkt2").unwrap();

    {
        let access = replicas.local_access("wcmkt", AccessMode::Read).unwrap();
        assert_eq!(access.alias(), "wcmkt2");
        assert_eq!(access.handle().kind(), HandleKind::ReadOnly);
        access.query("SELECT 1", &[]).unwrap();
        assert_eq!(lock.readers(), 1);
    }

    assert_eq!(lock.readers(), 0);
    assert_eq!(connector.handle(HandleKind::ReadOnly).queries(), 1);
}

#[test]
fn write_access_holds_off_resilient_reads() {
    let (replicas, connector) = scripted_replicas();
    let released = Arc::new(AtomicBool::new(false));

    let access = replicas.local_access("wcmkt2", AccessMode::Write).unwrap();
    assert_eq!(access.handle().kind(), HandleKind::Primary);

    let (tx, rx) = mpsc::channel();
    let reader = {
        let replicas = replicas.clone();
        let released = Arc::clone(&released);
        thread::spawn(move || {
            replicas.read("wcmkt2", "SELECT 1", &[]).unwrap();
            tx.send(released.load(Ordering::SeqCst)).unwrap();
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert_eq!(connector.primary().queries(), 0, "read ran under the write permit");
    released.store(true, Ordering::SeqCst);
    drop(access);

    assert!(rx.recv().unwrap());
    reader.join().unwrap();
}

#[test]
fn failed_handle_open_releases_the_permit() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = AliasCatalog::new([AliasConfig::new(
        "sde",
        dir.path().join("missing.db"),
        "libsql://sde",
        Credential::default(),
    )]);
    let replicas = sqlite_replicas(catalog);

    assert!(replicas.local_access("sde", AccessMode::Read).is_err());

    let lock = replicas.registry().lock("sde").unwrap();
    assert_eq!(lock.readers(), 0);
    assert!(!lock.is_write_locked());
}

#[test]
fn stale_replica_is_refreshed_then_up_to_date() {
    let fixture = ReplicaFixture::new("wcmkt2", "2025-03-01 14:00:00");
    fixture.set_local("2025-03-01 12:00:00");
    let replicas = sqlite_replicas(fixture.catalog());

    let first = replicas.refresh_if_stale("wcmkt2").unwrap();
    match first {
        RefreshOutcome::Synced(record) => assert_eq!(record.status(), SyncStatus::Healthy),
        other => panic!("expected a sync, got {other:?}"),
    }

    assert_eq!(
        replicas.refresh_if_stale("wcmkt2").unwrap(),
        RefreshOutcome::UpToDate
    );
    let rows = replicas
        .read("wcmkt2", "SELECT MAX(last_update) FROM marketstats", &[])
        .unwrap();
    assert_eq!(rows.scalar(), Some(&Value::from("2025-03-01 14:00:00")));
}

#[test]
fn corrupted_replica_is_refreshed() {
    let fixture = ReplicaFixture::new("wcmkt2", "2025-03-01 14:00:00");
    fixture.corrupt_local();
    let replicas = sqlite_replicas(fixture.catalog());

    let outcome = replicas.refresh_if_stale("wcmkt2").unwrap();
    assert!(matches!(outcome, RefreshOutcome::Synced(_)), "{outcome:?}");
}

#[test]
fn first_read_pulls_a_missing_replica() {
    let fixture = ReplicaFixture::new("wcmkt2", "2025-03-01 12:00:00");
    let replicas = sqlite_replicas(fixture.catalog());
    assert!(!fixture.local_path().exists());

    let rows = replicas
        .read("wcmkt2", "SELECT COUNT(*) FROM marketstats", &[])
        .unwrap();
    assert_eq!(rows.scalar(), Some(&Value::Integer(3)));
    assert!(fixture.local_path().exists());

    let report = replicas.initialize();
    assert!(matches!(report.entries[0].status, InitStatus::Present));
    let rows = replicas
        .read("wcmkt2", "SELECT type_name FROM marketstats WHERE type_id = 34", &[])
        .unwrap();
    assert_eq!(rows.scalar(), Some(&Value::from("Tritanium")));
}

#[test]
fn missing_replica_is_refreshed() {
    let fixture = ReplicaFixture::new("wcmkt2", "2025-03-01 12:00:00");
    let replicas = sqlite_replicas(fixture.catalog());

    let outcome = replicas.refresh_if_stale("wcmkt2").unwrap();
    match outcome {
        RefreshOutcome::Synced(record) => assert_eq!(record.status(), SyncStatus::Healthy),
        other => panic!("expected a sync, got {other:?}"),
    }
    assert!(fixture.local_path().exists());
}

#[test]
fn read_access_to_missing_replica_creates_nothing() {
    let fixture = ReplicaFixture::new("wcmkt2", "2025-03-01 12:00:00");
    let replicas = sqlite_replicas(fixture.catalog());

    let err = replicas.local_access("wcmkt2", AccessMode::Read).unwrap_err();
    assert!(err.is_corruption(), "{err}");
    assert!(!fixture.local_path().exists());

    let report = replicas.initialize();
    assert!(matches!(report.entries[0].status, InitStatus::Synced(_)));
    let access = replicas.local_access("wcmkt2", AccessMode::Read).unwrap();
    let rows = access.query("SELECT COUNT(*) FROM marketstats", &[]).unwrap();
    assert_eq!(rows.scalar(), Some(&Value::Integer(3)));
}

#[test]
fn untracked_alias_is_not_refreshed() {
    let fixture = ReplicaFixture::new("sde", "2025-03-01 14:00:00");
    let catalog = AliasCatalog::new([AliasConfig::new(
        "sde",
        fixture.local_path(),
        file_url(&fixture.remote_path()),
        Credential::default(),
    )]);
    let replicas = sqlite_replicas(catalog);

    assert_eq!(
        replicas.refresh_if_stale("sde").unwrap(),
        RefreshOutcome::Untracked
    );
    assert!(!fixture.local_path().exists());
}

#[test]
fn initialize_syncs_only_missing_replicas() {
    let present = ReplicaFixture::new("present", "2025-03-01 12:00:00");
    present.set_local("2025-03-01 12:00:00");
    let missing = ReplicaFixture::new("missing", "2025-03-01 12:00:00");
    let broken = AliasConfig::new(
        "broken",
        missing.root().join("local").join("broken.db"),
        file_url(&missing.root().join("remote").join("absent.db")),
        Credential::default(),
    );
    let catalog = AliasCatalog::new([present.config(), missing.config(), broken]);
    let replicas = sqlite_replicas(catalog);

    let report = replicas.initialize();

    let statuses: Vec<_> = report
        .entries
        .iter()
        .map(|entry| (entry.alias.as_str(), &entry.status))
        .collect();
    assert_eq!(statuses.len(), 3);
    assert!(matches!(statuses[0], ("broken", InitStatus::Failed(_))));
    assert!(matches!(statuses[1], ("missing", InitStatus::Synced(_))));
    assert!(matches!(statuses[2], ("present", InitStatus::Present)));
    assert!(!report.is_success());
    assert_eq!(report.failures().count(), 1);
    assert!(missing.local_path().exists());
}
