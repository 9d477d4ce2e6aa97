use rusqlite::{Connection, OpenFlags};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::DbSettings;
use crate::error::{ReportError, Result};

/// Failure to open the database. `code` is the driver status code.
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    #[error("unsupported database driver '{0}'")]
    UnsupportedDriver(String),

    #[error("database connection failed (code {code}): {message}")]
    Driver { code: i32, message: String },
}

impl ConnectionError {
    pub fn code(&self) -> Option<i32> {
        match self {
            ConnectionError::Driver { code, .. } => Some(*code),
            ConnectionError::UnsupportedDriver(_) => None,
        }
    }
}

impl From<rusqlite::Error> for ConnectionError {
    fn from(err: rusqlite::Error) -> Self {
        let code = match &err {
            rusqlite::Error::SqliteFailure(e, _) => e.extended_code,
            _ => -1,
        };
        ConnectionError::Driver {
            code,
            message: err.to_string(),
        }
    }
}

/// Holds the single database connection shared by every query.
///
/// `connect()` is idempotent and never retries on its own; after a failure
/// the connection stays unset until the user triggers `connect()` again.
pub struct ConnectionManager {
    settings: DbSettings,
    conn: Option<Connection>,
    last_error: Option<ConnectionError>,
}

impl ConnectionManager {
    pub fn new(settings: DbSettings) -> Self {
        Self {
            settings,
            conn: None,
            last_error: None,
        }
    }

    /// Wrap an already-open connection (in-memory databases, tests).
    pub fn with_connection(settings: DbSettings, conn: Connection) -> Self {
        Self {
            settings,
            conn: Some(conn),
            last_error: None,
        }
    }

    pub fn connect(&mut self) -> bool {
        if self.conn.is_some() {
            return true;
        }

        debug!(
            connection = %self.settings.redacted_connection_string(),
            "connecting to database"
        );

        match self.open() {
            Ok(conn) => {
                info!(database = %self.settings.database, "database connection established");
                self.conn = Some(conn);
                self.last_error = None;
                true
            }
            Err(e) => {
                error!(code = ?e.code(), error = %e, "database connection failed");
                self.last_error = Some(e);
                false
            }
        }
    }

    fn open(&self) -> Result<Connection, ConnectionError> {
        match self.settings.driver.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => {
                debug!("credentials and transport encryption do not apply to a local sqlite file");
                // Reports never write, so the file is opened read-only and
                // must already exist.
                let conn = Connection::open_with_flags(
                    self.database_path(),
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )?;
                // Force the file to be read now so a non-database file fails here
                conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
                    row.get::<_, i64>(0)
                })?;
                Ok(conn)
            }
            other => Err(ConnectionError::UnsupportedDriver(other.to_string())),
        }
    }

    /// `SERVER` is the directory holding the database file, `DATABASE` its name.
    pub fn database_path(&self) -> PathBuf {
        let server = self.settings.server.trim();
        if server.is_empty() || server == "." {
            PathBuf::from(&self.settings.database)
        } else {
            PathBuf::from(server).join(&self.settings.database)
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    pub fn connection(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(ReportError::NotConnected)
    }

    pub fn last_error(&self) -> Option<&ConnectionError> {
        self.last_error.as_ref()
    }

    /// Close the connection. A later `connect()` opens a fresh one.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                error!(error = %e, "error while closing database connection");
            }
        }
    }
}
