/// Facade Module
///
/// A `Facade` owns at most one database connection and exposes the lifecycle
/// operations (open, close) and the data operations (single insert, bulk
/// insert, query) that run against it.
///
/// ## Contract
///
/// - Every operation returns a `Result`; none panics or exits the process.
/// - Every failure is also logged through `tracing`.
/// - Data operations on a closed facade fail with `DbError::NotConnected`
///   without touching the connector or the database.
/// - Operations are serialized by an internal mutex, so a facade can be
///   shared between threads.
/// - Dropping a facade closes its connection.

use super::connection::{ConnectionState, Connector, OpenConnection, SqliteConnector};
use super::insert::{self, is_interrupted, BulkInsertReport, ConflictPolicy};
use super::query::{run_query, QueryIntent, QueryOutcome, QueryResult};
use super::record::{Params, Record};
use crate::config::ConnectionConfig;
use crate::core::{DbError, Result};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Number of SQLite VM instructions between deadline checks.
const PROGRESS_INTERVAL: i32 = 1_000;

/// Single-connection database facade
pub struct Facade {
    connector: Box<dyn Connector>,
    slot: Mutex<Option<OpenConnection>>,
}

impl Default for Facade {
    fn default() -> Self {
        Facade::new()
    }
}

impl std::fmt::Debug for Facade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Facade").field("state", &self.state()).finish()
    }
}

impl Facade {
    /// Creates a closed facade backed by the SQLite connector
    pub fn new() -> Self {
        Facade::with_connector(SqliteConnector)
    }

    /// Creates a closed facade that opens connections through `connector`
    pub fn with_connector(connector: impl Connector + 'static) -> Self {
        Facade {
            connector: Box::new(connector),
            slot: Mutex::new(None),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        if self.lock().is_some() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Opens a connection described by `config`.
    ///
    /// If a connection is already open it is replaced: the new connection is
    /// established first, and only on success is the old one closed. A failed
    /// open leaves the facade exactly as it was.
    ///
    /// # Errors
    ///
    /// `DbError::Connection` or `DbError::InvalidTarget` when the database
    /// cannot be opened.
    pub fn open_connection(&self, config: &ConnectionConfig) -> Result<()> {
        let target = config.target();
        let conn = match self.connector.connect(config) {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to open connection to {}: {}", target, e);
                return Err(e);
            }
        };

        let mut guard = self.lock();
        if let Some(previous) = guard.replace(OpenConnection::new(conn, config)) {
            info!("Replacing open connection to {} with {}", previous.target, target);
            close_quietly(previous);
        }
        info!("Connection to {} opened", target);
        Ok(())
    }

    /// Closes the open connection, if any.
    ///
    /// Idempotent. Errors raised while closing are logged, not returned; the
    /// facade is closed afterwards either way.
    pub fn close_connection(&self) {
        let taken = self.lock().take();
        match taken {
            Some(open) => close_quietly(open),
            None => debug!("close_connection called with no open connection"),
        }
    }

    /// Inserts one record into `table` and returns its row id.
    ///
    /// An empty record inserts a row of column defaults.
    ///
    /// # Errors
    ///
    /// `DbError::NotConnected` when closed, `DbError::Write` when the insert
    /// fails. The connection stays open after a failed insert.
    pub fn insert_record(&self, table: &str, record: &Record) -> Result<i64> {
        let result = self.with_open("insert_record", |open| {
            guarded(open, |conn| insert::insert_one(conn, table, record))
        });
        if let Ok(rowid) = result {
            debug!("Inserted row {} into {}", rowid, table);
        }
        result
    }

    /// Inserts a batch of records into `table` under `policy`.
    ///
    /// The batch must be non-empty and every record must have the same
    /// columns. All rows go in within one transaction.
    ///
    /// # Errors
    ///
    /// `DbError::InvalidInput` for an empty or non-uniform batch,
    /// `DbError::BulkWrite` when the transaction is rolled back.
    pub fn insert_multiple_records(
        &self,
        table: &str,
        records: &[Record],
        policy: &ConflictPolicy,
    ) -> Result<BulkInsertReport> {
        let report = self.with_open("insert_multiple_records", |open| {
            guarded(open, |conn| insert::insert_many(conn, table, records, policy))
        })?;

        if report.failures.is_empty() {
            info!(
                "Bulk insert into {}: {} of {} rows written, {} skipped",
                table, report.written, report.attempted, report.skipped
            );
        } else {
            warn!(
                "Bulk insert into {}: {} of {} rows written, {} rows failed",
                table,
                report.written,
                report.attempted,
                report.failures.len()
            );
            for failure in &report.failures {
                debug!("Row {} rejected: {}", failure.index, failure.message);
            }
        }
        Ok(report)
    }

    /// Runs a parameterized statement.
    ///
    /// Parameters are always bound, never interpolated into `sql`.
    /// A read that matches nothing returns `QueryOutcome::Rows` with zero
    /// rows; a failing read returns an error.
    pub fn execute_query(
        &self,
        sql: &str,
        params: &Params,
        intent: QueryIntent,
    ) -> Result<QueryOutcome> {
        debug!("Executing {:?} query: {}", intent, sql);
        self.with_open("execute_query", |open| {
            guarded(open, |conn| run_query(conn, sql, params, intent))
        })
    }

    /// Runs a read query and returns its rows.
    pub fn select(&self, sql: &str, params: &Params) -> Result<QueryResult> {
        match self.execute_query(sql, params, QueryIntent::Read)? {
            QueryOutcome::Rows(result) => Ok(result),
            QueryOutcome::Affected(_) => Err(DbError::InvalidInput("read query returned no row set".to_string())),
        }
    }

    /// Runs a write statement and returns the number of affected rows.
    pub fn execute(&self, sql: &str, params: &Params) -> Result<usize> {
        match self.execute_query(sql, params, QueryIntent::Write)? {
            QueryOutcome::Affected(count) => Ok(count),
            QueryOutcome::Rows(_) => Err(DbError::InvalidInput("write statement returned rows".to_string())),
        }
    }

    /// The slot stays consistent even if a holder panicked, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Option<OpenConnection>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `op` against the open connection, logging any failure.
    fn with_open<T>(&self, operation: &str, op: impl FnOnce(&mut OpenConnection) -> Result<T>) -> Result<T> {
        let result = match self.lock().as_mut() {
            Some(open) => op(open),
            None => Err(DbError::NotConnected),
        };
        if let Err(e) = &result {
            error!("{} failed: {}", operation, e);
        }
        result
    }
}

impl Drop for Facade {
    fn drop(&mut self) {
        let taken = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(open) = taken {
            debug!("Closing connection to {} on drop", open.target);
            close_quietly(open);
        }
    }
}

fn close_quietly(open: OpenConnection) {
    let target = open.target;
    match open.conn.close() {
        Ok(()) => info!("Connection to {} closed", target),
        Err((_conn, e)) => warn!("Error closing connection to {}: {}", target, e),
    }
}

/// Runs `op` with the connection's query timeout enforced.
///
/// A progress handler interrupts the statement once the deadline passes; the
/// resulting error is reported as `DbError::Timeout`. The handler is removed
/// afterwards so the connection carries no deadline between operations.
fn guarded<T>(open: &mut OpenConnection, op: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
    let Some((timeout, deadline)) = open
        .query_timeout
        .and_then(|timeout| Some((timeout, Instant::now().checked_add(timeout)?)))
    else {
        return op(&mut open.conn);
    };

    open.conn
        .progress_handler(PROGRESS_INTERVAL, Some(move || Instant::now() >= deadline));
    let result = op(&mut open.conn);
    open.conn.progress_handler(0, None::<fn() -> bool>);

    result.map_err(|e| into_timeout(e, timeout))
}

fn into_timeout(err: DbError, timeout: Duration) -> DbError {
    let interrupted = match &err {
        DbError::Write { source, .. }
        | DbError::BulkWrite { source, .. }
        | DbError::Query { source }
        | DbError::Database(source) => is_interrupted(source),
        _ => false,
    };
    if interrupted {
        DbError::Timeout(timeout)
    } else {
        err
    }
}
