use crate::core::{DbError, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable naming the prefix of the connection variables.
pub const SERVICE_PREFIX_VAR: &str = "DB_SERVICE_PREFIX";

/// Dotenv file loaded before reading connection variables.
pub const DOTENV_FILE: &str = ".env.local";

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub database: ConnectionConfig,
    pub logging: Option<LoggingConfig>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
}

/// Resolved connection settings handed to `Facade::open_connection`.
///
/// `database` is a file path or `:memory:`. `host`, `port`, `user` and
/// `password` are the conventional connection options; the SQLite backend
/// only accepts a local host and ignores the rest.
#[derive(Clone, PartialEq, Deserialize)]
pub struct ConnectionConfig {
    pub database: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Create the database file when it does not exist yet.
    #[serde(default)]
    pub create_if_missing: bool,
    #[serde(default = "default_foreign_keys")]
    pub foreign_keys: bool,
    /// How long to wait on a locked database before failing.
    pub busy_timeout_ms: Option<u64>,
    /// Upper bound on the run time of a single data operation.
    pub query_timeout_ms: Option<u64>,
}

fn default_foreign_keys() -> bool {
    true
}

impl ConnectionConfig {
    /// Connection settings for an existing database file or `:memory:`.
    pub fn new(database: impl Into<String>) -> Self {
        ConnectionConfig {
            database: database.into(),
            host: None,
            port: None,
            user: None,
            password: None,
            create_if_missing: false,
            foreign_keys: true,
            busy_timeout_ms: None,
            query_timeout_ms: None,
        }
    }

    /// A private in-memory database.
    pub fn in_memory() -> Self {
        Self::new(":memory:").create_if_missing(true)
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = Some(duration_ms(timeout));
        self
    }

    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout_ms = Some(duration_ms(timeout));
        self
    }

    pub fn busy_timeout_duration(&self) -> Option<Duration> {
        self.busy_timeout_ms.map(Duration::from_millis)
    }

    pub fn query_timeout_duration(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }

    /// Rejects settings that cannot work.
    ///
    /// A query timeout of zero would interrupt every data operation at its
    /// first progress check.
    pub fn validate(&self) -> Result<()> {
        if self.query_timeout_ms == Some(0) {
            return Err(DbError::Config(
                "query_timeout_ms must be greater than zero; omit it to disable the timeout".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_in_memory(&self) -> bool {
        self.database == ":memory:"
    }

    /// Human-readable description of the target, safe to log.
    pub fn target(&self) -> String {
        match &self.host {
            Some(host) => format!("{}:{}", host, self.database),
            None => self.database.clone(),
        }
    }

    /// Reads connection settings from `{prefix}_DB_*` environment variables.
    ///
    /// `{prefix}_DB_NAME` is required; every other variable is optional.
    pub fn from_env(prefix: &str) -> Result<Self> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Loads `.env.local` if present, then reads the prefix from
    /// `DB_SERVICE_PREFIX` and the settings from the prefixed variables.
    pub fn from_service_env() -> Result<Self> {
        load_dotenv();
        let prefix = std::env::var(SERVICE_PREFIX_VAR)
            .map_err(|_| DbError::Config(format!("{} not set in environment", SERVICE_PREFIX_VAR)))?;
        Self::from_env(&prefix)
    }

    /// Builds settings from an arbitrary key lookup.
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{}_DB_{}", prefix, name)).filter(|value| !value.trim().is_empty())
        };

        let database = var("NAME")
            .ok_or_else(|| DbError::Config(format!("{}_DB_NAME not set", prefix)))?;

        let port = var("PORT")
            .map(|raw| {
                raw.trim()
                    .parse::<u16>()
                    .map_err(|e| DbError::Config(format!("{}_DB_PORT: {}", prefix, e)))
            })
            .transpose()?;

        let parse_ms = |name: &str| -> Result<Option<u64>> {
            var(name)
                .map(|raw| {
                    raw.trim()
                        .parse::<u64>()
                        .map_err(|e| DbError::Config(format!("{}_DB_{}: {}", prefix, name, e)))
                })
                .transpose()
        };

        let create_if_missing = match var("CREATE") {
            Some(raw) => parse_flag(&raw)
                .ok_or_else(|| DbError::Config(format!("{}_DB_CREATE: expected a boolean, got {:?}", prefix, raw)))?,
            None => false,
        };

        let config = ConnectionConfig {
            database,
            host: var("HOST"),
            port,
            user: var("USER"),
            password: var("PASSWORD"),
            create_if_missing,
            foreign_keys: true,
            busy_timeout_ms: parse_ms("BUSY_TIMEOUT_MS")?,
            query_timeout_ms: parse_ms("QUERY_TIMEOUT_MS")?,
        };
        config.validate()?;
        Ok(config)
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("database", &self.database)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("create_if_missing", &self.create_if_missing)
            .field("foreign_keys", &self.foreign_keys)
            .field("busy_timeout_ms", &self.busy_timeout_ms)
            .field("query_timeout_ms", &self.query_timeout_ms)
            .finish()
    }
}

/// Milliseconds in `duration`, saturating at `u64::MAX`.
fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Loads `.env.local` from the current directory or one of its parents.
///
/// A missing file is not an error; a malformed one is logged and skipped.
pub fn load_dotenv() {
    match dotenvy::from_filename(DOTENV_FILE) {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("Ignoring {}: {}", DOTENV_FILE, e),
    }
}

/// Default configuration file location, `<config dir>/dbfacade/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("dbfacade").join("config.toml"))
}

/// Loads configuration from a TOML file at the given path.
///
/// # Arguments
///
/// * `path` - The file path to the TOML configuration file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    parse_config(&content).map_err(|e| match e {
        DbError::Config(msg) => DbError::Config(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Parses configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).map_err(|e| DbError::Config(e.to_string()))?;
    config.database.validate()?;
    Ok(config)
}
