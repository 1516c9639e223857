//! Process-wide facade.
//!
//! Free functions over one lazily created `Facade` shared by the whole
//! process, for callers that want a single connection without threading a
//! handle through their code. Code that can hold its own `Facade` should.

use crate::config::ConnectionConfig;
use crate::core::db::{BulkInsertReport, ConflictPolicy, Facade, Params, QueryIntent, QueryOutcome, Record};
use crate::core::Result;
use once_cell::sync::OnceCell;

static GLOBAL: OnceCell<Facade> = OnceCell::new();

/// The process-wide facade, created closed on first use.
pub fn global() -> &'static Facade {
    GLOBAL.get_or_init(Facade::new)
}

/// Opens (or replaces) the process-wide connection.
pub fn open_connection(config: &ConnectionConfig) -> Result<()> {
    global().open_connection(config)
}

/// Closes the process-wide connection; a no-op when none is open.
pub fn close_connection() {
    global().close_connection()
}

pub fn is_open() -> bool {
    GLOBAL.get().map(Facade::is_open).unwrap_or(false)
}

pub fn insert_record(table: &str, record: &Record) -> Result<i64> {
    global().insert_record(table, record)
}

pub fn insert_multiple_records(
    table: &str,
    records: &[Record],
    policy: &ConflictPolicy,
) -> Result<BulkInsertReport> {
    global().insert_multiple_records(table, records, policy)
}

pub fn execute_query(sql: &str, params: &Params, intent: QueryIntent) -> Result<QueryOutcome> {
    global().execute_query(sql, params, intent)
}
