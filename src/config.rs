//! Process-start configuration.
//!
//! # Responsibility
//! - Carry store location and logging settings as one immutable value.
//! - Bootstrap logging and the store from that value, in order.
//!
//! # Invariants
//! - Configuration is assembled once at process start and passed to the
//!   components that need it; the core never reads ambient global settings.

use crate::db::{open_db, open_db_in_memory, DbError};
use crate::logging::{default_log_level, init_logging};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Where the circulation store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// On-disk SQLite database file.
    File(PathBuf),
    /// Private in-memory database; each bootstrap yields a fresh store.
    InMemory,
}

/// Immutable configuration assembled once at process start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub store: StoreLocation,
    pub log_level: String,
    /// Absolute directory for rolling log files; `None` disables file
    /// logging entirely.
    pub log_dir: Option<PathBuf>,
}

impl CoreConfig {
    /// Creates a configuration with build-mode default log level and file
    /// logging disabled.
    pub fn new(store: StoreLocation) -> Self {
        Self {
            store,
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }

    /// Enables file logging at the given level into the given directory.
    pub fn with_logging(mut self, level: impl Into<String>, log_dir: impl Into<PathBuf>) -> Self {
        self.log_level = level.into();
        self.log_dir = Some(log_dir.into());
        self
    }
}

/// Failure while bringing the process-level plumbing up.
#[derive(Debug)]
pub enum BootstrapError {
    Logging(String),
    Db(DbError),
}

impl Display for BootstrapError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Logging(message) => write!(f, "logging bootstrap failed: {message}"),
            Self::Db(err) => write!(f, "store bootstrap failed: {err}"),
        }
    }
}

impl Error for BootstrapError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Logging(_) => None,
            Self::Db(err) => Some(err),
        }
    }
}

impl From<DbError> for BootstrapError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

/// Initializes logging (when configured) and opens the migrated store.
pub fn bootstrap(config: &CoreConfig) -> Result<Connection, BootstrapError> {
    if let Some(log_dir) = config.log_dir.as_deref() {
        init_logging(&config.log_level, log_dir).map_err(BootstrapError::Logging)?;
    }

    let conn = match &config.store {
        StoreLocation::File(path) => open_db(path)?,
        StoreLocation::InMemory => open_db_in_memory()?,
    };
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::{bootstrap, CoreConfig, StoreLocation};

    #[test]
    fn default_config_has_no_file_logging() {
        let config = CoreConfig::new(StoreLocation::InMemory);
        assert!(config.log_dir.is_none());
        assert!(!config.log_level.is_empty());
    }

    #[test]
    fn with_logging_sets_level_and_dir() {
        let config =
            CoreConfig::new(StoreLocation::InMemory).with_logging("info", "/var/log/biblio");
        assert_eq!(config.log_level, "info");
        assert!(config.log_dir.is_some());
    }

    #[test]
    fn bootstrap_opens_a_migrated_in_memory_store() {
        let config = CoreConfig::new(StoreLocation::InMemory);
        let conn = bootstrap(&config).unwrap();

        let version: u32 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, crate::db::migrations::latest_version());
    }
}
