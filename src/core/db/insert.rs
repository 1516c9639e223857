/// Insert Module
///
/// Single-row and bulk inserts. Bulk inserts run inside one transaction and
/// use multi-row `VALUES` lists, chunked to stay under SQLite's bind
/// parameter limit; `ConflictPolicy::SkipFailed` falls back to row-by-row
/// inserts guarded by savepoints.

use super::record::{quote_column, quote_table, Record};
use crate::core::{DbError, Result};
use rusqlite::{params_from_iter, Connection, ErrorCode};
use std::collections::BTreeSet;

/// Highest number of bind parameters placed in one statement.
///
/// 999 is the lowest limit any SQLite build ships with.
pub const MAX_BIND_PARAMS: usize = 999;

/// How a bulk insert treats rows that collide with existing unique keys.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Any failing row rolls back the whole batch
    #[default]
    Abort,
    /// Rows that hit a uniqueness conflict are skipped (`ON CONFLICT DO NOTHING`)
    Ignore,
    /// Colliding rows update the existing row instead
    Upsert {
        /// Columns of the unique key that defines a conflict
        conflict_columns: Vec<String>,
        /// Columns overwritten on conflict; empty means every non-key column
        update_columns: Vec<String>,
    },
    /// Rows are inserted one at a time; rows that fail for any reason are
    /// rolled back individually and reported while the rest go in
    SkipFailed,
}

impl ConflictPolicy {
    /// Upsert on the given key, updating every other inserted column.
    pub fn upsert<I, S>(conflict_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ConflictPolicy::Upsert {
            conflict_columns: conflict_columns.into_iter().map(Into::into).collect(),
            update_columns: Vec::new(),
        }
    }
}

/// A row rejected during a `SkipFailed` bulk insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    /// Position of the row in the input batch
    pub index: usize,
    pub message: String,
}

/// Outcome of a bulk insert.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BulkInsertReport {
    /// Rows handed to the insert
    pub attempted: usize,
    /// Rows inserted, or inserted-or-updated under `Upsert`
    pub written: usize,
    /// Rows left out because they conflicted with an existing key
    pub skipped: usize,
    /// Rows rejected under `SkipFailed`
    pub failures: Vec<RowFailure>,
}

impl BulkInsertReport {
    /// True when every attempted row was written.
    pub fn is_complete(&self) -> bool {
        self.written == self.attempted
    }
}

/// Builds a single-row insert with one `?` per column.
///
/// An empty column list inserts a row of defaults.
pub fn build_insert_sql(table: &str, columns: &[&str]) -> Result<String> {
    let table = quote_table(table)?;
    if columns.is_empty() {
        return Ok(format!("INSERT INTO {} DEFAULT VALUES", table));
    }
    Ok(format!(
        "INSERT INTO {} ({}) VALUES {}",
        table,
        quote_columns(columns)?,
        placeholder_group(columns.len())
    ))
}

/// Builds a multi-row insert for `rows` rows, with the conflict clause the
/// policy calls for.
pub fn build_bulk_insert_sql(
    table: &str,
    columns: &[&str],
    rows: usize,
    policy: &ConflictPolicy,
) -> Result<String> {
    if columns.is_empty() {
        return Err(DbError::InvalidInput("records have no columns".to_string()));
    }
    if rows == 0 {
        return Err(DbError::InvalidInput("no rows to insert".to_string()));
    }

    let group = placeholder_group(columns.len());
    let values = vec![group.as_str(); rows].join(", ");
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_table(table)?,
        quote_columns(columns)?,
        values
    );
    sql.push_str(&conflict_clause(columns, policy)?);
    Ok(sql)
}

fn conflict_clause(columns: &[&str], policy: &ConflictPolicy) -> Result<String> {
    match policy {
        ConflictPolicy::Abort | ConflictPolicy::SkipFailed => Ok(String::new()),
        ConflictPolicy::Ignore => Ok(" ON CONFLICT DO NOTHING".to_string()),
        ConflictPolicy::Upsert {
            conflict_columns,
            update_columns,
        } => {
            if conflict_columns.is_empty() {
                return Err(DbError::InvalidInput("upsert needs at least one conflict column".to_string()));
            }
            let inserted: BTreeSet<&str> = columns.iter().copied().collect();
            for column in conflict_columns.iter().chain(update_columns) {
                if !inserted.contains(column.as_str()) {
                    return Err(DbError::InvalidInput(format!(
                        "upsert column {} is not among the inserted columns",
                        column
                    )));
                }
            }

            let updates: Vec<&str> = if update_columns.is_empty() {
                columns
                    .iter()
                    .copied()
                    .filter(|c| !conflict_columns.iter().any(|k| k.as_str() == *c))
                    .collect()
            } else {
                update_columns.iter().map(String::as_str).collect()
            };
            if updates.is_empty() {
                return Err(DbError::InvalidInput("upsert has no columns to update".to_string()));
            }

            let keys: Vec<&str> = conflict_columns.iter().map(String::as_str).collect();
            let assignments = updates
                .iter()
                .map(|c| quote_column(c).map(|q| format!("{} = excluded.{}", q, q)))
                .collect::<Result<Vec<_>>>()?
                .join(", ");
            Ok(format!(" ON CONFLICT ({}) DO UPDATE SET {}", quote_columns(&keys)?, assignments))
        }
    }
}

fn quote_columns(columns: &[&str]) -> Result<String> {
    Ok(columns
        .iter()
        .map(|c| quote_column(c))
        .collect::<Result<Vec<_>>>()?
        .join(", "))
}

fn placeholder_group(width: usize) -> String {
    format!("({})", vec!["?"; width].join(", "))
}

/// Inserts one record under auto-commit and returns its row id.
pub(crate) fn insert_one(conn: &Connection, table: &str, record: &Record) -> Result<i64> {
    let columns: Vec<&str> = record.columns().collect();
    let sql = build_insert_sql(table, &columns)?;
    let write_error = |source| DbError::Write {
        table: table.to_string(),
        source,
    };

    let mut stmt = conn.prepare_cached(&sql).map_err(write_error)?;
    stmt.execute(params_from_iter(record.values())).map_err(write_error)?;
    Ok(conn.last_insert_rowid())
}

/// Inserts a batch of records in one transaction according to `policy`.
pub(crate) fn insert_many(
    conn: &mut Connection,
    table: &str,
    records: &[Record],
    policy: &ConflictPolicy,
) -> Result<BulkInsertReport> {
    let columns = batch_columns(records)?;
    match policy {
        ConflictPolicy::SkipFailed => insert_row_by_row(conn, table, &columns, records),
        _ => insert_chunked(conn, table, &columns, records, policy),
    }
}

/// Checks the batch is non-empty and uniform, returning its column list.
fn batch_columns(records: &[Record]) -> Result<Vec<&str>> {
    let first = records
        .first()
        .ok_or_else(|| DbError::InvalidInput("no records to insert".to_string()))?;
    if first.is_empty() {
        return Err(DbError::InvalidInput("records have no columns".to_string()));
    }
    if let Some(index) = records.iter().position(|r| !r.same_columns(first)) {
        return Err(DbError::InvalidInput(format!(
            "record {} has a different column set than record 0",
            index
        )));
    }
    Ok(first.columns().collect())
}

fn insert_chunked(
    conn: &mut Connection,
    table: &str,
    columns: &[&str],
    records: &[Record],
    policy: &ConflictPolicy,
) -> Result<BulkInsertReport> {
    // Validate the statement shape before opening a transaction.
    build_bulk_insert_sql(table, columns, 1, policy)?;

    let bulk_error = |source| DbError::BulkWrite {
        table: table.to_string(),
        attempted: records.len(),
        source,
    };
    let rows_per_chunk = (MAX_BIND_PARAMS / columns.len()).max(1);

    let tx = conn.transaction().map_err(bulk_error)?;
    let mut written = 0;
    for chunk in records.chunks(rows_per_chunk) {
        let sql = build_bulk_insert_sql(table, columns, chunk.len(), policy)?;
        let mut stmt = tx.prepare_cached(&sql).map_err(bulk_error)?;
        written += stmt
            .execute(params_from_iter(chunk.iter().flat_map(Record::values)))
            .map_err(bulk_error)?;
    }
    tx.commit().map_err(bulk_error)?;

    Ok(BulkInsertReport {
        attempted: records.len(),
        written,
        skipped: records.len().saturating_sub(written),
        failures: Vec::new(),
    })
}

fn insert_row_by_row(
    conn: &mut Connection,
    table: &str,
    columns: &[&str],
    records: &[Record],
) -> Result<BulkInsertReport> {
    let sql = build_insert_sql(table, columns)?;
    let bulk_error = |source| DbError::BulkWrite {
        table: table.to_string(),
        attempted: records.len(),
        source,
    };

    let mut tx = conn.transaction().map_err(bulk_error)?;
    let mut report = BulkInsertReport {
        attempted: records.len(),
        ..BulkInsertReport::default()
    };

    for (index, record) in records.iter().enumerate() {
        let savepoint = tx.savepoint().map_err(bulk_error)?;
        match savepoint.execute(&sql, params_from_iter(record.values())) {
            Ok(changed) => {
                savepoint.commit().map_err(bulk_error)?;
                report.written += changed;
            }
            // An interrupted statement means the deadline passed; stop the batch.
            Err(source) if is_interrupted(&source) => return Err(bulk_error(source)),
            Err(source) => {
                // Dropping the savepoint rolls this row back.
                drop(savepoint);
                report.failures.push(RowFailure {
                    index,
                    message: source.to_string(),
                });
            }
        }
    }
    tx.commit().map_err(bulk_error)?;

    Ok(report)
}

pub(crate) fn is_interrupted(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::OperationInterrupted)
}
