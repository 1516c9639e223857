/// Connection Management Module
///
/// Turns resolved connection settings into a live SQLite connection and
/// tracks the facade's connection state.

use crate::config::ConnectionConfig;
use crate::core::{DbError, Result};
use rusqlite::{Connection, OpenFlags};
use std::time::Duration;
use tracing::debug;

/// Lifecycle state of a facade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection is held; data operations fail immediately
    #[default]
    Closed,
    /// A connection is open and data operations run against it
    Open,
}

/// Establishes connections for a facade.
///
/// The facade never opens connections on its own; everything goes through
/// this seam, so a test can count or refuse connection attempts.
pub trait Connector: Send + Sync {
    fn connect(&self, config: &ConnectionConfig) -> Result<Connection>;
}

/// Connector for local SQLite databases.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

impl Connector for SqliteConnector {
    /// Opens the database named by `config.database`.
    ///
    /// Without `create_if_missing` a nonexistent file is a connection error.
    /// The schema is read once after opening so that a file which is not a
    /// SQLite database is rejected here rather than on first use.
    fn connect(&self, config: &ConnectionConfig) -> Result<Connection> {
        config.validate()?;
        check_host(config)?;

        if config.port.is_some() || config.user.is_some() || config.password.is_some() {
            debug!("SQLite ignores port, user and password for {}", config.target());
        }

        let target = config.target();
        let connection_error = |source| DbError::Connection {
            target: target.clone(),
            source,
        };

        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if config.create_if_missing || config.is_in_memory() {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }

        let conn = if config.is_in_memory() {
            Connection::open_in_memory_with_flags(flags)
        } else {
            Connection::open_with_flags(&config.database, flags)
        }
        .map_err(connection_error)?;

        conn.pragma_update(None, "foreign_keys", config.foreign_keys)
            .map_err(connection_error)?;

        if let Some(timeout) = config.busy_timeout_duration() {
            conn.busy_timeout(timeout).map_err(connection_error)?;
        }

        probe(&conn).map_err(connection_error)?;

        Ok(conn)
    }
}

/// Reads the schema table; fails on files that are not SQLite databases.
fn probe(conn: &Connection) -> rusqlite::Result<()> {
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))?;
    Ok(())
}

/// Hosts that name this machine.
const LOCAL_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "::1"];

fn check_host(config: &ConnectionConfig) -> Result<()> {
    match config.host.as_deref().map(str::trim) {
        None | Some("") => Ok(()),
        Some(host) if LOCAL_HOSTS.iter().any(|local| local.eq_ignore_ascii_case(host)) => Ok(()),
        Some(host) => Err(DbError::InvalidTarget(format!(
            "host {} is not reachable by the SQLite backend; only local databases are supported",
            host
        ))),
    }
}

/// A connection together with the settings it was opened with
pub(crate) struct OpenConnection {
    pub(crate) conn: Connection,
    pub(crate) target: String,
    pub(crate) query_timeout: Option<Duration>,
}

impl OpenConnection {
    pub(crate) fn new(conn: Connection, config: &ConnectionConfig) -> Self {
        OpenConnection {
            conn,
            target: config.target(),
            query_timeout: config.query_timeout_duration(),
        }
    }
}
