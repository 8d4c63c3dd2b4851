//! Schema and update-log introspection
//!
//! Local reads go through the [`ResilientReader`]; remote reads go straight
//! to the remote handle.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::validate_identifier;
use crate::handle::{RowSet, Value};
use crate::reader::ResilientReader;
use crate::{Error, Result};

/// Default name of the table recording per-table update times.
pub const DEFAULT_UPDATE_LOG_TABLE: &str = "updatelog";

/// Default age, in minutes, after which a table is considered stale.
pub const DEFAULT_STALE_AFTER_MINUTES: i64 = 120;

/// Which copy of the database to inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Source {
    #[default]
    Local,
    Remote,
}

/// One row of `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub cid: i64,
    pub name: String,
    pub decl_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    pub primary_key: bool,
}

/// Update state of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableUpdate {
    pub updated: Option<DateTime<Utc>>,
    pub seconds_since: Option<i64>,
    pub needs_update: bool,
}

impl TableUpdate {
    pub fn time_since(&self) -> Option<TimeDelta> {
        self.seconds_since.map(TimeDelta::seconds)
    }
}

/// Parse an update-log timestamp as UTC.
///
/// Accepts RFC 3339, naive `YYYY-MM-DD HH:MM:SS[.f]` (with a space or `T`),
/// and integer unix seconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Text(text) => {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Some(parsed.with_timezone(&Utc));
            }
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .map(|naive| naive.and_utc())
        }
        Value::Integer(secs) => DateTime::from_timestamp(*secs, 0),
        _ => None,
    }
}

/// Read-only introspection over replicas.
#[derive(Debug, Clone)]
pub struct Inspector {
    reader: ResilientReader,
    update_log_table: String,
    stale_after: TimeDelta,
}

impl Inspector {
    pub fn new(reader: ResilientReader) -> Self {
        Self {
            reader,
            update_log_table: DEFAULT_UPDATE_LOG_TABLE.to_string(),
            stale_after: TimeDelta::minutes(DEFAULT_STALE_AFTER_MINUTES),
        }
    }

    pub fn with_update_log_table(mut self, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_identifier(&table)?;
        self.update_log_table = table;
        Ok(self)
    }

    pub fn with_stale_after(mut self, stale_after: TimeDelta) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn update_log_table(&self) -> &str {
        &self.update_log_table
    }

    fn run(&self, alias: &str, source: Source, sql: &str, params: &[Value]) -> Result<RowSet> {
        match source {
            Source::Local => self.reader.read(alias, sql, params),
            Source::Remote => self.reader.read_remote(alias, sql, params),
        }
    }

    /// User table names, excluding SQLite's internal tables.
    pub fn table_list(&self, alias: &str, source: Source) -> Result<Vec<String>> {
        let rows = self.run(
            alias,
            source,
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
            &[],
        )?;
        Ok(rows
            .rows
            .iter()
            .filter_map(|row| row.first().and_then(Value::as_str))
            .filter(|name| !name.contains("sqlite"))
            .map(String::from)
            .collect())
    }

    /// Column metadata for `table`.
    pub fn table_columns(&self, alias: &str, table: &str, source: Source) -> Result<Vec<ColumnInfo>> {
        validate_identifier(table)?;
        let rows = self.run(alias, source, &format!("PRAGMA table_info({table})"), &[])?;

        rows.rows
            .iter()
            .map(|row| match row.as_slice() {
                [cid, name, decl_type, not_null, default_value, pk] => Ok(ColumnInfo {
                    cid: cid.as_i64().unwrap_or_default(),
                    name: name.to_string(),
                    decl_type: decl_type.to_string(),
                    not_null: not_null.as_i64().is_some_and(|v| v != 0),
                    default_value: (!default_value.is_null()).then(|| default_value.to_string()),
                    primary_key: pk.as_i64().is_some_and(|v| v != 0),
                }),
                _ => Err(Error::UnexpectedResult {
                    alias: alias.to_string(),
                    message: format!("table_info row has {} columns", row.len()),
                }),
            })
            .collect()
    }

    /// Most recent update-log timestamp for `table`.
    pub fn most_recent_update(
        &self,
        alias: &str,
        table: &str,
        source: Source,
    ) -> Result<Option<DateTime<Utc>>> {
        let sql = format!(
            "SELECT timestamp FROM {} WHERE table_name = ?1 ORDER BY timestamp DESC LIMIT 1",
            self.update_log_table
        );
        let rows = self.run(alias, source, &sql, &[Value::from(table)])?;
        let updated = rows.scalar().and_then(parse_timestamp);
        tracing::debug!(alias, table, ?updated, "read most recent update");
        Ok(updated)
    }

    /// Update state for each of `tables` as of `now`.
    ///
    /// Tables with no update-log entry always need an update.
    pub fn update_status(
        &self,
        alias: &str,
        tables: &[&str],
        source: Source,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<String, TableUpdate>> {
        let mut status = BTreeMap::new();
        for table in tables {
            let updated = self.most_recent_update(alias, table, source)?;
            let time_since = updated.map(|at| now - at);
            status.insert(
                table.to_string(),
                TableUpdate {
                    updated,
                    seconds_since: time_since.map(|d| d.num_seconds()),
                    needs_update: time_since.is_none_or(|d| d > self.stale_after),
                },
            );
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_supported_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap();
        for text in [
            "2025-03-01T12:30:00Z",
            "2025-03-01T12:30:00+00:00",
            "2025-03-01 12:30:00",
            "2025-03-01 12:30:00.000000",
            "2025-03-01T12:30:00",
            "2025-03-01 12:30",
        ] {
            assert_eq!(parse_timestamp(&Value::from(text)), Some(expected), "{text}");
        }
        assert_eq!(
            parse_timestamp(&Value::Integer(expected.timestamp())),
            Some(expected)
        );
        assert_eq!(parse_timestamp(&Value::Null), None);
        assert_eq!(parse_timestamp(&Value::from("yesterday")), None);
    }
}
