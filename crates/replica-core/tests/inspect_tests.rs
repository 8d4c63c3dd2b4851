//! Tests for schema and update-log introspection

use std::sync::Arc;

use chrono::{TimeDelta, TimeZone, Utc};
use pretty_assertions::assert_eq;
use replica_core::{FileRemote, Replicas, Source, SqliteConnector};
use replica_test_utils::ReplicaFixture;

fn synced(last_update: &str) -> (ReplicaFixture, Replicas) {
    let fixture = ReplicaFixture::new("wcmkt2", last_update);
    let replicas = Replicas::new(
        fixture.catalog(),
        Arc::new(SqliteConnector::new()),
        Arc::new(FileRemote::new()),
    );
    replicas.sync("wcmkt2").unwrap();
    (fixture, replicas)
}

#[test]
fn lists_user_tables_on_both_sides() {
    let (_fixture, replicas) = synced("2025-03-01 12:00:00");
    let inspector = replicas.inspector();

    let expected = vec!["marketstats".to_string(), "updatelog".to_string()];
    assert_eq!(inspector.table_list("wcmkt2", Source::Local).unwrap(), expected);
    assert_eq!(inspector.table_list("wcmkt2", Source::Remote).unwrap(), expected);
}

#[test]
fn describes_table_columns() {
    let (_fixture, replicas) = synced("2025-03-01 12:00:00");

    let columns = replicas
        .inspector()
        .table_columns("wcmkt2", "marketstats", Source::Local)
        .unwrap();

    let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["type_id", "type_name", "price", "last_update"]);
    assert!(columns[0].primary_key);
    assert_eq!(columns[0].decl_type, "INTEGER");
    assert!(columns[1].not_null);
    assert_eq!(columns[2].default_value, None);
}

#[test]
fn rejects_unsafe_table_names() {
    let (_fixture, replicas) = synced("2025-03-01 12:00:00");
    let err = replicas
        .inspector()
        .table_columns("wcmkt2", "marketstats); DROP TABLE updatelog; --", Source::Local)
        .unwrap_err();
    assert!(matches!(err, replica_core::Error::InvalidIdentifier { .. }));
}

#[test]
fn reads_most_recent_update() {
    let (_fixture, replicas) = synced("2025-03-01 12:00:00");
    let expected = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

    let updated = replicas
        .inspector()
        .most_recent_update("wcmkt2", "marketstats", Source::Local)
        .unwrap();
    assert_eq!(updated, Some(expected));

    let missing = replicas
        .inspector()
        .most_recent_update("wcmkt2", "doctrines", Source::Remote)
        .unwrap();
    assert_eq!(missing, None);
}

#[test]
fn update_status_flags_stale_and_missing_tables() {
    let (_fixture, replicas) = synced("2025-03-01 12:00:00");
    let updated = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    let inspector = replicas.inspector();

    let fresh = inspector
        .update_status(
            "wcmkt2",
            &["marketstats", "doctrines"],
            Source::Local,
            updated + TimeDelta::minutes(90),
        )
        .unwrap();
    assert!(!fresh["marketstats"].needs_update);
    assert_eq!(fresh["marketstats"].time_since(), Some(TimeDelta::minutes(90)));
    assert!(fresh["doctrines"].needs_update);
    assert_eq!(fresh["doctrines"].updated, None);

    let stale = inspector
        .update_status(
            "wcmkt2",
            &["marketstats"],
            Source::Local,
            updated + TimeDelta::hours(3),
        )
        .unwrap();
    assert!(stale["marketstats"].needs_update);
}

#[test]
fn stale_threshold_is_configurable() {
    let (_fixture, replicas) = synced("2025-03-01 12:00:00");
    let updated = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    let inspector = replicas
        .inspector()
        .clone()
        .with_stale_after(TimeDelta::minutes(30));

    let status = inspector
        .update_status(
            "wcmkt2",
            &["marketstats"],
            Source::Local,
            updated + TimeDelta::minutes(45),
        )
        .unwrap();
    assert!(status["marketstats"].needs_update);
}
