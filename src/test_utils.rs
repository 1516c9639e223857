/// # Test Utilities Module
///
/// Fixtures shared by the unit and integration tests:
/// - File-backed databases in temporary directories, so a second
///   independent connection can verify what the facade wrote
/// - A standard schema with uniqueness and check constraints
/// - Record builders and error assertions

use crate::config::ConnectionConfig;
use crate::core::db::{Facade, Record};
use crate::core::{DbError, Result};
use rusqlite::Connection;
use std::path::PathBuf;
use tempfile::TempDir;

/// A database file in its own temporary directory
pub struct DatabaseFixture {
    // Held so the directory outlives the fixture's connections.
    _dir: TempDir,
    pub path: PathBuf,
}

impl DatabaseFixture {
    /// Creates an empty database file
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("fixture.db");
        Connection::open(&path)?;
        Ok(DatabaseFixture { _dir: dir, path })
    }

    /// Creates a database with the standard schema
    pub fn with_schema() -> Result<Self> {
        let fixture = Self::new()?;
        fixture.raw()?.execute_batch(
            "
            CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                age INTEGER CHECK (age IS NULL OR age >= 0),
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER REFERENCES users (id) ON DELETE CASCADE,
                body TEXT
            );
            ",
        )?;
        Ok(fixture)
    }

    /// Connection settings pointing at this fixture
    pub fn config(&self) -> ConnectionConfig {
        ConnectionConfig::new(self.path.to_string_lossy())
    }

    /// A facade already connected to this fixture
    pub fn open_facade(&self) -> Result<Facade> {
        let facade = Facade::new();
        facade.open_connection(&self.config())?;
        Ok(facade)
    }

    /// An independent connection, bypassing the facade
    pub fn raw(&self) -> Result<Connection> {
        Ok(Connection::open(&self.path)?)
    }

    /// Row count of `table`, read through an independent connection
    pub fn count_rows(&self, table: &str) -> i64 {
        self.raw()
            .and_then(|conn| {
                Ok(conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |row| row.get(0))?)
            })
            .unwrap_or_else(|e| panic!("counting rows of {} failed: {}", table, e))
    }

    /// Inserts users directly, bypassing the facade
    pub fn seed_users(&self, names: &[&str]) -> Result<()> {
        let conn = self.raw()?;
        for name in names {
            conn.execute(
                "INSERT INTO users (username, email) VALUES (?1, ?2)",
                (name, format!("{}@example.com", name)),
            )?;
        }
        Ok(())
    }
}

/// A `users` record with a derived email address
pub fn user(name: &str) -> Record {
    Record::new()
        .with("username", name.to_string())
        .with("email", format!("{}@example.com", name))
}

/// Assertions about error values
pub mod error_testing {
    use super::DbError;

    /// Asserts the result failed with an error the predicate accepts
    pub fn assert_error<T: std::fmt::Debug>(
        result: &std::result::Result<T, DbError>,
        expected_variant: fn(&DbError) -> bool,
        context: &str,
    ) {
        match result {
            Ok(value) => panic!("Expected error but got Ok({:?}): {}", value, context),
            Err(err) => assert!(expected_variant(err), "Unexpected error {:?}: {}", err, context),
        }
    }

    /// Verify the error message says what failed
    pub fn verify_error_message_quality<T>(result: &std::result::Result<T, DbError>, context: &str) {
        if let Err(ref error) = result {
            let error_str = error.to_string();

            assert!(!error_str.is_empty(), "Error message should not be empty in {}", context);
            assert!(error_str.len() > 10, "Error message should be descriptive in {}", context);

            let lower = error_str.to_lowercase();
            let has_operation_context = lower.contains("error")
                || lower.contains("could not")
                || lower.contains("no open")
                || lower.contains("invalid");
            assert!(
                has_operation_context,
                "Error should indicate what operation failed: '{}' in {}",
                error_str, context
            );
        }
    }
}
