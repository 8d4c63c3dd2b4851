//! Two-hourly sync schedule and its persisted state
//!
//! Syncs are expected on even UTC hours. The state file remembers when the
//! last sync completed and when the next one is due.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::io::{read_locked, write_atomic};
use crate::Result;

/// Timestamp format used in the state file.
pub const STATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

/// Default state file name.
pub const DEFAULT_STATE_FILE: &str = "last_sync_state.json";

/// Sync slots in the order they are listed in the state file.
pub const SYNC_TIMES: [&str; 12] = [
    "12:00", "14:00", "16:00", "18:00", "20:00", "22:00", "00:00", "02:00", "04:00", "06:00",
    "08:00", "10:00",
];

fn floor_hour(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

/// The slot following `last`, or the latest slot at or before `now` when
/// that one has already passed.
pub fn next_sync_after(last: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let step = if last.hour() % 2 == 0 { 2 } else { 1 };
    let slot = floor_hour(last) + TimeDelta::hours(step);
    if slot >= now {
        return slot;
    }

    let current = floor_hour(now);
    if now.hour() % 2 == 0 {
        current
    } else {
        current - TimeDelta::hours(1)
    }
}

mod state_time {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::STATE_TIME_FORMAT;

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&at.format(STATE_TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&text, STATE_TIME_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

/// Persisted schedule state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    #[serde(with = "state_time")]
    pub last_sync: DateTime<Utc>,
    #[serde(with = "state_time")]
    pub next_sync: DateTime<Utc>,
    #[serde(default = "default_sync_times")]
    pub sync_times: Vec<String>,
    #[serde(default)]
    pub sync_needed: bool,
}

fn default_sync_times() -> Vec<String> {
    SYNC_TIMES.iter().map(|s| s.to_string()).collect()
}

fn state_default_time(text: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(text, STATE_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .unwrap_or(DateTime::UNIX_EPOCH)
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            last_sync: state_default_time("2025-01-01 00:00 UTC"),
            next_sync: state_default_time("2025-01-01 12:00 UTC"),
            sync_times: default_sync_times(),
            sync_needed: false,
        }
    }
}

impl SyncState {
    /// Whether a sync is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now > self.next_sync
    }

    /// Human readable time until the next sync.
    pub fn describe_until(&self, now: DateTime<Utc>) -> String {
        let remaining = self.next_sync - now;
        if remaining <= TimeDelta::zero() {
            return "update available".to_string();
        }

        let hours = remaining.num_hours();
        let minutes = remaining.num_minutes() % 60;
        let plural = |n: i64, unit: &str| {
            if n == 1 {
                format!("{n} {unit}")
            } else {
                format!("{n} {unit}s")
            }
        };
        if hours > 0 {
            format!("{}, {}", plural(hours, "hour"), plural(minutes, "minute"))
        } else {
            plural(minutes, "minute")
        }
    }
}

/// JSON-backed store for [`SyncState`].
#[derive(Debug, Clone)]
pub struct SyncStateStore {
    path: PathBuf,
}

impl SyncStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored state, falling back to the default when the file is
    /// missing or unreadable as JSON.
    pub fn load(&self) -> Result<SyncState> {
        let Some(content) = read_locked(&self.path)? else {
            return Ok(SyncState::default());
        };
        match serde_json::from_str(&content) {
            Ok(state) => Ok(state),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "ignoring unreadable sync state");
                Ok(SyncState::default())
            }
        }
    }

    pub fn save(&self, state: &SyncState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)?;
        write_atomic(&self.path, json.as_bytes())
    }

    /// Record a sync that completed at `at`.
    pub fn record_sync(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> Result<SyncState> {
        let state = SyncState {
            last_sync: at,
            next_sync: next_sync_after(at, now),
            sync_times: default_sync_times(),
            sync_needed: false,
        };
        self.save(&state)?;
        tracing::debug!(
            path = %self.path.display(),
            last_sync = %state.last_sync,
            next_sync = %state.next_sync,
            "recorded sync"
        );
        Ok(state)
    }

    /// Current state with `sync_needed` evaluated at `now`.
    pub fn status(&self, now: DateTime<Utc>) -> Result<SyncState> {
        let mut state = self.load()?;
        state.sync_needed = state.is_due(now);
        Ok(state)
    }
}
