//! Connection trait abstracting the underlying SQL driver.
//!
//! The engine talks to the database only through [`SqlConnection`]: statement
//! execution with positional `?` parameters, catalog introspection, DDL and
//! transaction control. SQLite and PostgreSQL implement it.

use super::escape::quote_identifier;
use super::value::Value;
use super::DbError;

/// Rows returned by a query.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// First cell of the first row, if any.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }

    /// The first column of every row.
    pub fn first_column(self) -> Vec<Value> {
        self.rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect()
    }
}

/// A live column as reported by the database catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Upper-case type in the vocabulary of the type registry (`VARCHAR(250)`).
    pub sql_type: String,
    pub nullable: bool,
}

/// One key column of a live index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumn {
    pub name: String,
    pub descending: bool,
}

/// A live index as reported by the database catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
    pub columns: Vec<IndexColumn>,
}

/// Core trait for database connections.
///
/// Connections are used by one handle at a time; methods take `&self` and
/// implementations keep their driver state behind a `RefCell`.
pub trait SqlConnection: Send {
    /// Get the backend name for logging/debugging.
    fn backend_name(&self) -> &'static str;

    /// Execute a statement, returning the number of affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, DbError>;

    /// Run a query and collect every row.
    fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult, DbError>;

    /// Quote an identifier for this dialect.
    fn quote_identifier(&self, name: &str) -> String {
        quote_identifier(name)
    }

    /// Names of all non-system tables.
    fn table_names(&self) -> Result<Vec<String>, DbError>;

    /// Check if a table exists.
    fn table_exists(&self, name: &str) -> Result<bool, DbError> {
        Ok(self
            .table_names()?
            .iter()
            .any(|t| t.eq_ignore_ascii_case(name)))
    }

    /// Columns of a table in physical order.
    fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>, DbError>;

    /// Explicit indexes of a table, excluding constraint-backed ones.
    fn indexes(&self, table: &str) -> Result<Vec<IndexInfo>, DbError>;

    fn drop_table(&self, table: &str) -> Result<(), DbError> {
        let sql = format!("DROP TABLE IF EXISTS {}", self.quote_identifier(table));
        self.execute(&sql, &[]).map(|_| ())
    }

    fn drop_index(&self, _table: &str, index: &str) -> Result<(), DbError> {
        let sql = format!("DROP INDEX IF EXISTS {}", self.quote_identifier(index));
        self.execute(&sql, &[]).map(|_| ())
    }

    /// Whether `CREATE INDEX` accepts column prefix lengths such as `name(250)`.
    fn supports_prefix_indexes(&self) -> bool {
        false
    }

    fn begin(&self) -> Result<(), DbError> {
        self.execute("BEGIN", &[]).map(|_| ())
    }

    fn commit(&self) -> Result<(), DbError> {
        self.execute("COMMIT", &[]).map(|_| ())
    }

    fn rollback(&self) -> Result<(), DbError> {
        self.execute("ROLLBACK", &[]).map(|_| ())
    }

    /// Drop and re-establish the underlying session after a transient failure.
    fn reconnect(&self) -> Result<(), DbError> {
        Ok(())
    }
}

/// Normalize a SQL type string for comparison (upper case, single spaces).
pub fn normalize_sql_type(sql_type: &str) -> String {
    sql_type
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
        .replace(" (", "(")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("varchar(250)", "VARCHAR(250)")]
    #[case("double   precision", "DOUBLE PRECISION")]
    #[case("VARCHAR (80)", "VARCHAR(80)")]
    fn test_normalize_sql_type(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_sql_type(input), expected);
    }

    #[rstest]
    fn test_query_result_scalar_and_first_column() {
        let result = QueryResult {
            headers: vec!["id".to_string()],
            rows: vec![vec![Value::Int(1)], vec![Value::Int(2)]],
        };
        assert_eq!(result.scalar(), Some(&Value::Int(1)));
        assert_eq!(result.first_column(), vec![Value::Int(1), Value::Int(2)]);
    }

    #[rstest]
    fn test_trait_is_object_safe() {
        fn accepts_connection(_conn: &dyn SqlConnection) {}
        let _ = accepts_connection;
    }
}
