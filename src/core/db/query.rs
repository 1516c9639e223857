/// Query Execution Module
///
/// Runs parameterized SQL against a connection and collects the results.
/// Reads come back as a `QueryResult` (possibly with zero rows); writes come
/// back as an affected-row count. Failures are errors, never empty results.

use super::record::{Params, Record, Value};
use crate::core::{DbError, Result};
use rusqlite::{Batch, Connection};
use serde_json::{Map, Number};

/// Whether a statement is expected to return rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryIntent {
    /// SELECT-like statements; rows are collected
    Read,
    /// INSERT/UPDATE/DELETE/DDL; the affected-row count is returned
    Write,
}

impl From<bool> for QueryIntent {
    /// `true` means a select query.
    fn from(is_select: bool) -> Self {
        if is_select {
            QueryIntent::Read
        } else {
            QueryIntent::Write
        }
    }
}

/// Rows returned by a read query
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    /// Column names from the query result
    pub columns: Vec<String>,
    /// Rows of data, one value per column
    pub rows: Vec<Vec<Value>>,
    /// Number of rows returned
    pub row_count: usize,
}

impl QueryResult {
    /// Creates a new QueryResult from column names and row data
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let row_count = rows.len();
        QueryResult {
            columns,
            rows,
            row_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value at `row`, `column`, if both exist.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(index)
    }

    /// Rows as records keyed by column name.
    ///
    /// Duplicate column names collapse to the last occurrence.
    pub fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| self.columns.iter().cloned().zip(row.iter().cloned()).collect())
            .collect()
    }

    /// Rows as a JSON array of objects, columns in result order.
    pub fn to_json(&self) -> serde_json::Value {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let object: Map<String, serde_json::Value> = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().map(value_to_json))
                    .collect();
                serde_json::Value::Object(object)
            })
            .collect();
        serde_json::Value::Array(rows)
    }
}

/// Result of `execute_query`
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Rows from a read; may be empty
    Rows(QueryResult),
    /// Rows changed by a write
    Affected(usize),
}

impl QueryOutcome {
    pub fn into_rows(self) -> Option<QueryResult> {
        match self {
            QueryOutcome::Rows(result) => Some(result),
            QueryOutcome::Affected(_) => None,
        }
    }

    pub fn affected(&self) -> Option<usize> {
        match self {
            QueryOutcome::Rows(_) => None,
            QueryOutcome::Affected(count) => Some(*count),
        }
    }
}

/// Prepares, binds and runs one statement.
///
/// # Errors
///
/// Returns `DbError::Query` if the statement fails to prepare or execute,
/// and `DbError::InvalidInput` if `sql` holds no statement or more than one,
/// if the parameters do not fit the statement, or if a read is requested for
/// a statement that produces no columns.
pub(crate) fn run_query(
    conn: &Connection,
    sql: &str,
    params: &Params,
    intent: QueryIntent,
) -> Result<QueryOutcome> {
    let query_error = |source| DbError::Query { source };

    let mut batch = Batch::new(conn, sql);
    let mut stmt = match batch.next().map_err(query_error)? {
        Some(stmt) => stmt,
        None => return Err(DbError::InvalidInput("no SQL statement to run".to_string())),
    };
    // Anything after the first statement other than whitespace and comments.
    if !matches!(batch.next(), Ok(None)) {
        return Err(DbError::InvalidInput(
            "multiple statements; run them one at a time".to_string(),
        ));
    }
    params.bind(&mut stmt)?;

    match intent {
        QueryIntent::Write => {
            let affected = stmt.raw_execute().map_err(query_error)?;
            Ok(QueryOutcome::Affected(affected))
        }
        QueryIntent::Read => {
            let column_count = stmt.column_count();
            if column_count == 0 {
                return Err(DbError::InvalidInput(
                    "statement returns no rows; run it as a write".to_string(),
                ));
            }
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

            let mut rows = Vec::new();
            let mut cursor = stmt.raw_query();
            while let Some(row) = cursor.next().map_err(query_error)? {
                let mut values = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    values.push(Value::from(row.get_ref(i).map_err(query_error)?));
                }
                rows.push(values);
            }

            Ok(QueryOutcome::Rows(QueryResult::new(columns, rows)))
        }
    }
}

/// Formats a SQLite value for display
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(t) => t.clone(),
        Value::Blob(b) => format!("<BLOB: {} bytes>", b.len()),
    }
}

/// Converts a SQLite value to JSON; blobs become lowercase hex strings.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => serde_json::Value::Number((*i).into()),
        Value::Real(f) => Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(t) => serde_json::Value::String(t.clone()),
        Value::Blob(b) => serde_json::Value::String(b.iter().map(|byte| format!("{:02x}", byte)).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn setup_test_table(conn: &Connection) {
        conn.execute_batch(
            "
            CREATE TABLE test (
                id INTEGER PRIMARY KEY,
                name TEXT,
                value REAL,
                data BLOB
            );
            INSERT INTO test (name, value, data) VALUES ('Alice', 123.5, X'48656C6C6F');
            INSERT INTO test (name, value) VALUES ('Bob', 678.25);
            INSERT INTO test (name, value) VALUES (NULL, NULL);
        ",
        )
        .unwrap();
    }

    #[test]
    fn test_read_collects_typed_rows() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);

        let result = run_query(&conn, "SELECT id, name, value FROM test ORDER BY id", &Params::None, QueryIntent::Read)
            .unwrap()
            .into_rows()
            .unwrap();

        assert_eq!(result.columns, vec!["id", "name", "value"]);
        assert_eq!(result.row_count, 3);
        assert_eq!(result.rows[0], vec![Value::Integer(1), Value::Text("Alice".into()), Value::Real(123.5)]);
        assert_eq!(result.value(2, "name"), Some(&Value::Null));
        assert_eq!(result.value(0, "missing"), None);
    }

    #[test]
    fn test_zero_rows_is_success() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);

        let outcome = run_query(
            &conn,
            "SELECT * FROM test WHERE name = ?",
            &Params::positional(["Nobody".to_string()]),
            QueryIntent::Read,
        )
        .unwrap();
        let result = outcome.into_rows().unwrap();
        assert!(result.is_empty());
        assert_eq!(result.columns.len(), 4);
    }

    #[test]
    fn test_query_failure_is_error() {
        let conn = Connection::open_in_memory().unwrap();

        let result = run_query(&conn, "SELECT * FROM nonexistent_table", &Params::None, QueryIntent::Read);
        match result {
            Err(DbError::Query { source }) => assert!(source.to_string().contains("no such table")),
            other => panic!("Expected Query error, got {:?}", other),
        }
    }

    #[test]
    fn test_write_returns_affected_rows() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);

        let outcome = run_query(
            &conn,
            "UPDATE test SET value = :v WHERE name IS NOT NULL",
            &Params::named([(":v", 1.0)]),
            QueryIntent::Write,
        )
        .unwrap();
        assert_eq!(outcome.affected(), Some(2));
    }

    #[test]
    fn test_read_intent_on_write_statement_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);

        let result = run_query(&conn, "DELETE FROM test", &Params::None, QueryIntent::Read);
        assert!(matches!(result, Err(DbError::InvalidInput(_))));
        let remaining: i64 = conn.query_row("SELECT COUNT(*) FROM test", [], |r| r.get(0)).unwrap();
        assert_eq!(remaining, 3);
    }

    #[test]
    fn test_records_and_json() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);

        let result = run_query(&conn, "SELECT name, data FROM test WHERE id = 1", &Params::None, QueryIntent::Read)
            .unwrap()
            .into_rows()
            .unwrap();

        let records = result.records();
        assert_eq!(records[0].get("name"), Some(&Value::Text("Alice".into())));
        assert_eq!(result.to_json(), json!([{ "name": "Alice", "data": "48656c6c6f" }]));
    }

    #[test]
    fn test_multiple_statements_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);

        for sql in [
            "INSERT INTO test (name) VALUES ('Carol'); DELETE FROM test",
            "SELECT * FROM test; SELECT 1",
            "UPDATE test SET value = 0; DELETE FROM no_such_table",
        ] {
            let result = run_query(&conn, sql, &Params::None, QueryIntent::Write);
            assert!(
                matches!(&result, Err(DbError::InvalidInput(msg)) if msg.contains("multiple statements")),
                "{}: {:?}",
                sql,
                result
            );
        }

        // Nothing ran, not even the first statement.
        let remaining: i64 = conn.query_row("SELECT COUNT(*) FROM test", [], |r| r.get(0)).unwrap();
        assert_eq!(remaining, 3);
        let zeroed: i64 = conn
            .query_row("SELECT COUNT(*) FROM test WHERE value = 0", [], |r| r.get(0))
            .unwrap();
        assert_eq!(zeroed, 0);
    }

    #[test]
    fn test_trailing_semicolon_and_comment_allowed() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);

        let outcome = run_query(
            &conn,
            "DELETE FROM test WHERE name IS NULL; -- cleanup\n",
            &Params::None,
            QueryIntent::Write,
        )
        .unwrap();
        assert_eq!(outcome.affected(), Some(1));
    }

    #[test]
    fn test_blank_sql_rejected() {
        let conn = Connection::open_in_memory().unwrap();

        for sql in ["", "   \n", "-- nothing", "/* nothing */ ;"] {
            for intent in [QueryIntent::Read, QueryIntent::Write] {
                let result = run_query(&conn, sql, &Params::None, intent);
                assert!(
                    matches!(&result, Err(DbError::InvalidInput(msg)) if msg.contains("no SQL statement")),
                    "{:?}: {:?}",
                    sql,
                    result
                );
            }
        }
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&Value::Null), "NULL");
        assert_eq!(format_value(&Value::Integer(7)), "7");
        assert_eq!(format_value(&Value::Blob(vec![1, 2, 3, 4, 5])), "<BLOB: 5 bytes>");
    }

    #[test]
    fn test_intent_from_flag() {
        assert_eq!(QueryIntent::from(true), QueryIntent::Read);
        assert_eq!(QueryIntent::from(false), QueryIntent::Write);
    }
}
