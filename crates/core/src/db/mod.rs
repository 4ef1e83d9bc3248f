//! SQLite delivery audit log.
//!
//! A [`Database`] is always fully migrated once it has been opened: callers
//! only ever see the typed delivery and dispatch queries in [`queries`].

pub mod queries;
pub mod schema;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::config::DaemonConfig;
use crate::errors::DatabaseError;

/// Handle to the delivery audit log.
///
/// Every delivery, its dispatches and their build outcomes are written
/// through this handle. The connection sits behind a `Mutex` so the handle
/// can be shared by the web handlers and the build runner.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the audit log configured for the daemon, creating its data
    /// directory when missing.
    pub fn open(daemon: &DaemonConfig) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(&daemon.data_dir)?;
        Self::open_path(daemon.database_path())
    }

    /// Open (or create) the audit log stored at `path`.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening delivery audit log");

        let conn = Connection::open(path)?;
        // The web server writes deliveries while the runner records outcomes.
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Self::migrated(conn)
    }

    /// A throwaway audit log, for tests and dry runs.
    pub fn in_memory() -> Result<Self, DatabaseError> {
        Self::migrated(Connection::open_in_memory()?)
    }

    fn migrated(conn: Connection) -> Result<Self, DatabaseError> {
        // Dispatch rows cascade with their delivery.
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::run_migrations(&conn)?;
        debug!("delivery audit log schema is up to date");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("audit log mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Run `f` in one transaction; an `Err` rolls everything back.
    pub(crate) fn transaction<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}
