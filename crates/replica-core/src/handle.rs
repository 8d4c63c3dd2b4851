//! Connection handles and the connector that creates them
//!
//! A [`Handle`] is a connection bound to one alias and one role. Handles are
//! only ever created by the [`Registry`](crate::Registry) through a
//! [`Connector`], which is the single place allowed to open files or sockets.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};

use crate::catalog::AliasConfig;
use crate::error::DriverError;

/// Role of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HandleKind {
    /// Read-write connection to the local replica
    Primary,
    /// Read-only connection to the local replica
    ReadOnly,
    /// Connection to the remote database
    Remote,
}

impl HandleKind {
    /// Whether this handle touches the local replica file.
    pub fn is_local(self) -> bool {
        !matches!(self, HandleKind::Remote)
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Primary => "primary",
            Self::ReadOnly => "read-only",
            Self::Remote => "remote",
        };
        f.write_str(name)
    }
}

/// A single SQL value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    /// Exact equality; reals compare by bit pattern.
    pub fn bit_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Real(a), Value::Real(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => f.write_str(s),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl From<rusqlite::types::Value> for Value {
    fn from(value: rusqlite::types::Value) -> Self {
        use rusqlite::types::Value as Sql;
        match value {
            Sql::Null => Value::Null,
            Sql::Integer(i) => Value::Integer(i),
            Sql::Real(r) => Value::Real(r),
            Sql::Text(s) => Value::Text(s),
            Sql::Blob(b) => Value::Blob(b),
        }
    }
}

impl From<&Value> for rusqlite::types::Value {
    fn from(value: &Value) -> Self {
        use rusqlite::types::Value as Sql;
        match value {
            Value::Null => Sql::Null,
            Value::Integer(i) => Sql::Integer(*i),
            Value::Real(r) => Sql::Real(*r),
            Value::Text(s) => Sql::Text(s.clone()),
            Value::Blob(b) => Sql::Blob(b.clone()),
        }
    }
}

/// Rows returned by a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First column of the first row, if any.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }
}

/// A connection bound to one alias and role.
///
/// Implementations must be safe to query from several threads at once.
pub trait Handle: Send + Sync + fmt::Debug {
    fn kind(&self) -> HandleKind;

    fn query(&self, sql: &str, params: &[Value]) -> Result<RowSet, DriverError>;

    /// Release the underlying connection(s). Further queries may reopen.
    fn close(&self) -> Result<(), DriverError>;
}

/// Creates handles for an alias.
pub trait Connector: Send + Sync {
    fn open(&self, config: &AliasConfig, kind: HandleKind) -> Result<Arc<dyn Handle>, DriverError>;
}

/// Path of a `file://` endpoint, or `None` for any other scheme.
pub fn file_endpoint(endpoint: &str) -> Option<PathBuf> {
    endpoint
        .strip_prefix("file://")
        .filter(|rest| !rest.is_empty())
        .map(PathBuf::from)
}

/// Connector for SQLite replica files.
///
/// Remote handles are only available for `file://` endpoints; networked
/// remotes need a dedicated connector.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteConnector;

impl SqliteConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for SqliteConnector {
    /// Local handles never create the replica file; only a pull does.
    fn open(&self, config: &AliasConfig, kind: HandleKind) -> Result<Arc<dyn Handle>, DriverError> {
        let (path, flags) = match kind {
            HandleKind::Primary => (
                config.local_path.clone(),
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            ),
            HandleKind::ReadOnly => (
                config.local_path.clone(),
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            ),
            HandleKind::Remote => {
                let path = file_endpoint(&config.remote_endpoint).ok_or_else(|| {
                    DriverError::new(format!(
                        "remote unreachable: no connector for endpoint '{}'",
                        config.remote_endpoint
                    ))
                })?;
                (
                    path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )
            }
        };

        let handle = SqliteHandle::open(path, flags, kind)?;
        Ok(Arc::new(handle))
    }
}

/// SQLite handle with a small pool of idle connections.
///
/// `rusqlite::Connection` cannot be shared between threads, so each query
/// borrows an idle connection (or opens one) and returns it afterwards.
pub struct SqliteHandle {
    path: PathBuf,
    flags: OpenFlags,
    kind: HandleKind,
    idle: Mutex<Vec<Connection>>,
}

impl fmt::Debug for SqliteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteHandle")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl SqliteHandle {
    /// Open a handle and eagerly create its first connection.
    pub fn open(path: impl Into<PathBuf>, flags: OpenFlags, kind: HandleKind) -> Result<Self, DriverError> {
        let path = path.into();
        let first = Connection::open_with_flags(&path, flags)?;
        tracing::debug!(path = %path.display(), %kind, "opened sqlite handle");
        Ok(Self {
            path,
            flags,
            kind,
            idle: Mutex::new(vec![first]),
        })
    }

    fn checkout(&self) -> Result<Connection, DriverError> {
        let pooled = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        match pooled {
            Some(conn) => Ok(conn),
            None => Ok(Connection::open_with_flags(&self.path, self.flags)?),
        }
    }

    fn checkin(&self, conn: Connection) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(conn);
    }
}

fn run_query(conn: &Connection, sql: &str, params: &[Value]) -> Result<RowSet, DriverError> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let params = rusqlite::params_from_iter(params.iter().map(rusqlite::types::Value::from));
    let mut rows = stmt.query(params)?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for index in 0..width {
            let value: rusqlite::types::Value = row.get(index)?;
            values.push(Value::from(value));
        }
        out.push(values);
    }

    Ok(RowSet::new(columns, out))
}

impl Handle for SqliteHandle {
    fn kind(&self) -> HandleKind {
        self.kind
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<RowSet, DriverError> {
        let conn = self.checkout()?;
        let result = run_query(&conn, sql, params);
        self.checkin(conn);
        result
    }

    fn close(&self) -> Result<(), DriverError> {
        let conns: Vec<Connection> = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        let mut first_error = None;
        for conn in conns {
            if let Err((_conn, err)) = conn.close() {
                first_error.get_or_insert(DriverError::from(err));
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
