//! Tests for the persisted sync schedule state

use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use replica_core::schedule::{SYNC_TIMES, SyncState, SyncStateStore};
use tempfile::tempdir;

#[test]
fn missing_state_file_loads_default() {
    let dir = tempdir().unwrap();
    let store = SyncStateStore::new(dir.path().join("last_sync_state.json"));

    assert_eq!(store.load().unwrap(), SyncState::default());
}

#[test]
fn unreadable_state_file_loads_default() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("last_sync_state.json");
    fs::write(&path, "{ not json").unwrap();

    let store = SyncStateStore::new(&path);
    assert_eq!(store.load().unwrap(), SyncState::default());
}

#[test]
fn record_sync_persists_schedule() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state").join("last_sync_state.json");
    let store = SyncStateStore::new(&path);
    let synced_at = Utc.with_ymd_and_hms(2025, 6, 1, 13, 25, 0).unwrap();

    let state = store.record_sync(synced_at, synced_at).unwrap();
    assert_eq!(state.next_sync, Utc.with_ymd_and_hms(2025, 6, 1, 14, 0, 0).unwrap());

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["last_sync"], "2025-06-01 13:25 UTC");
    assert_eq!(json["next_sync"], "2025-06-01 14:00 UTC");
    assert_eq!(json["sync_times"].as_array().unwrap().len(), SYNC_TIMES.len());
    assert_eq!(json["sync_needed"], false);

    assert_eq!(store.load().unwrap(), state);
}

#[test]
fn status_reports_due_sync() {
    let dir = tempdir().unwrap();
    let store = SyncStateStore::new(dir.path().join("last_sync_state.json"));
    let synced_at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    store.record_sync(synced_at, synced_at).unwrap();

    let before = store
        .status(Utc.with_ymd_and_hms(2025, 6, 1, 13, 0, 0).unwrap())
        .unwrap();
    assert!(!before.sync_needed);
    assert_eq!(
        before.describe_until(Utc.with_ymd_and_hms(2025, 6, 1, 13, 0, 0).unwrap()),
        "1 hour, 0 minutes"
    );

    let after = store
        .status(Utc.with_ymd_and_hms(2025, 6, 1, 14, 1, 0).unwrap())
        .unwrap();
    assert!(after.sync_needed);
}

#[test]
fn concurrent_records_leave_valid_state() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("last_sync_state.json");
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4u32)
        .map(|i| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let store = SyncStateStore::new(path);
                let at = Utc.with_ymd_and_hms(2025, 6, 1, 10 + i, 0, 0).unwrap();
                barrier.wait();
                store.record_sync(at, at)
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let content = fs::read_to_string(&path).unwrap();
    let state: SyncState = serde_json::from_str(&content).unwrap();
    assert!(state.next_sync > state.last_sync);
}
