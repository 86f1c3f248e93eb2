//! SQLite backend implementation using `rusqlite`.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode, ToSql};
use tracing::{debug, instrument};

use super::backend::{ColumnInfo, IndexColumn, IndexInfo, QueryResult, SqlConnection};
use super::escape::quote_identifier;
use super::value::Value;
use super::DbError;

/// How long a writer waits on a locked database before the error surfaces.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite connection, file-backed or in-memory.
pub struct SqliteConnection {
    conn: RefCell<Connection>,
    /// `None` for in-memory databases, which cannot be reopened.
    path: Option<PathBuf>,
}

impl SqliteConnection {
    /// Opens (or creates) a SQLite database at the given file path.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Self::connect(path)?;
        debug!("Opened SQLite database");
        Ok(Self {
            conn: RefCell::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Opens an in-memory SQLite database.
    pub fn open_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory().map_err(|e| DbError::OpenFailed {
            path: ":memory:".to_string(),
            message: e.to_string(),
        })?;
        debug!("Opened in-memory SQLite database");
        Ok(Self {
            conn: RefCell::new(conn),
            path: None,
        })
    }

    fn connect(path: &Path) -> Result<Connection, DbError> {
        let open_failed = |e: rusqlite::Error| DbError::OpenFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        };
        let conn = Connection::open(path).map_err(open_failed)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(open_failed)?;
        Ok(conn)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::from(rusqlite::types::Null),
            Value::Bool(b) => ToSqlOutput::from(i64::from(*b)),
            Value::Int(i) => ToSqlOutput::from(*i),
            Value::Float(f) => ToSqlOutput::from(*f),
            Value::Str(s) => ToSqlOutput::from(s.as_str()),
            Value::Bytes(b) => ToSqlOutput::from(b.as_slice()),
        })
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Str(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

fn map_error(e: rusqlite::Error) -> DbError {
    let transient = matches!(
        e.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    );
    if transient {
        DbError::Transient {
            message: e.to_string(),
        }
    } else {
        DbError::QueryFailed {
            message: e.to_string(),
        }
    }
}

impl SqlConnection for SqliteConnection {
    fn backend_name(&self) -> &'static str {
        if self.path.is_some() {
            "Sqlite"
        } else {
            "SqliteMem"
        }
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        let conn = self.conn.borrow();
        let affected = conn
            .execute(sql, params_from_iter(params.iter()))
            .map_err(map_error)?;
        Ok(affected as u64)
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult, DbError> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(sql).map_err(map_error)?;
        let headers: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let width = headers.len();

        let mut rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(map_error)?;
        let mut result = Vec::new();
        while let Some(row) = rows.next().map_err(map_error)? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_value_ref(row.get_ref(i).map_err(map_error)?));
            }
            result.push(values);
        }

        Ok(QueryResult {
            headers,
            rows: result,
        })
    }

    fn table_names(&self) -> Result<Vec<String>, DbError> {
        let result = self.query(
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite_%' ORDER BY name",
            &[],
        )?;
        Ok(result
            .first_column()
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }

    fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>, DbError> {
        let sql = format!("PRAGMA table_info({})", quote_identifier(table));
        let result = self.query(&sql, &[])?;
        // cid, name, type, notnull, dflt_value, pk
        Ok(result
            .rows
            .iter()
            .map(|row| ColumnInfo {
                name: row[1].as_str().unwrap_or_default().to_string(),
                sql_type: super::backend::normalize_sql_type(row[2].as_str().unwrap_or_default()),
                nullable: row[3].as_i64() == Some(0),
            })
            .collect())
    }

    fn indexes(&self, table: &str) -> Result<Vec<IndexInfo>, DbError> {
        let sql = format!("PRAGMA index_list({})", quote_identifier(table));
        let list = self.query(&sql, &[])?;

        let mut indexes = Vec::new();
        // seq, name, unique, origin, partial
        for row in &list.rows {
            let name = row[1].as_str().unwrap_or_default().to_string();
            let origin = row[3].as_str().unwrap_or_default();
            if origin != "c" || name.starts_with("sqlite_autoindex") {
                continue;
            }
            let unique = row[2].as_i64() == Some(1);

            let info_sql = format!("PRAGMA index_xinfo({})", quote_identifier(&name));
            let info = self.query(&info_sql, &[])?;
            // seqno, cid, name, desc, coll, key
            let columns = info
                .rows
                .iter()
                .filter(|r| r[5].as_i64() == Some(1))
                .map(|r| IndexColumn {
                    name: r[2].as_str().unwrap_or_default().to_string(),
                    descending: r[3].as_i64() == Some(1),
                })
                .collect();
            indexes.push(IndexInfo {
                name,
                unique,
                columns,
            });
        }
        Ok(indexes)
    }

    fn begin(&self) -> Result<(), DbError> {
        self.conn.borrow().execute_batch("BEGIN").map_err(map_error)
    }

    fn commit(&self) -> Result<(), DbError> {
        self.conn.borrow().execute_batch("COMMIT").map_err(map_error)
    }

    fn rollback(&self) -> Result<(), DbError> {
        self.conn.borrow().execute_batch("ROLLBACK").map_err(map_error)
    }

    fn reconnect(&self) -> Result<(), DbError> {
        if let Some(path) = &self.path {
            debug!(path = %path.display(), "Reconnecting to SQLite database");
            *self.conn.borrow_mut() = Self::connect(path)?;
        }
        Ok(())
    }
}
