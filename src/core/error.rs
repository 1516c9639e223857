/// Error Module
///
/// This module defines the error type returned by every facade operation.
/// Failures are values: nothing in the facade panics or terminates the caller,
/// and each variant carries enough detail to decide whether to continue.
use std::time::Duration;
use thiserror::Error;

/// Error type for the database facade.
///
/// The variants follow the failure kinds a caller can observe:
/// - Connection establishment (unopenable target, unsupported host)
/// - Data operations attempted without an open connection
/// - Single-row and bulk write failures
/// - Query execution failures and timeouts
/// - Invalid caller input and configuration problems
#[derive(Error, Debug)]
pub enum DbError {
    /// The database could not be opened or failed its liveness probe
    #[error("Connection error: could not open {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: rusqlite::Error,
    },

    /// The configured target cannot be served by this backend
    #[error("Connection error: {0}")]
    InvalidTarget(String),

    /// A data operation was attempted while no connection is open
    #[error("No open database connection")]
    NotConnected,

    /// A single-row insert failed
    #[error("Write error on {table}: {source}")]
    Write {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A bulk insert failed and its transaction was rolled back
    #[error("Bulk write error on {table}: batch of {attempted} rows rolled back: {source}")]
    BulkWrite {
        table: String,
        attempted: usize,
        #[source]
        source: rusqlite::Error,
    },

    /// A query failed to prepare or execute
    #[error("Query error: {source}")]
    Query {
        #[source]
        source: rusqlite::Error,
    },

    /// An operation ran past the configured query timeout and was interrupted
    #[error("Query interrupted after exceeding timeout of {0:?}")]
    Timeout(Duration),

    /// Caller-supplied arguments were rejected before reaching the database
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database errors outside a specific operation (transaction control, locks)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DbError {
    /// Returns the SQLite error code behind this error, if there is one.
    ///
    /// Useful to tell a constraint violation apart from a lost connection
    /// without matching on message text.
    pub fn sqlite_code(&self) -> Option<rusqlite::ErrorCode> {
        let source = match self {
            DbError::Connection { source, .. }
            | DbError::Write { source, .. }
            | DbError::BulkWrite { source, .. }
            | DbError::Query { source }
            | DbError::Database(source) => source,
            _ => return None,
        };
        match source {
            rusqlite::Error::SqliteFailure(err, _) => Some(err.code),
            _ => None,
        }
    }

    /// True when the error comes from a violated table constraint.
    pub fn is_constraint_violation(&self) -> bool {
        self.sqlite_code() == Some(rusqlite::ErrorCode::ConstraintViolation)
    }
}

/// Type alias for Result to use DbError as the error type.
pub type Result<T> = std::result::Result<T, DbError>;
