//! Database schema definitions and migration runner.
//!
//! Migrations are simple SQL strings applied in order. The `schema_version`
//! user-version pragma tracks which migrations have already been applied.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::DatabaseError;

/// All migrations, in order. Each entry is `(version, description, sql)`.
static MIGRATIONS: &[(u32, &str, &str)] = &[(
    1,
    "delivery audit log",
    r#"
    CREATE TABLE IF NOT EXISTS deliveries (
        id           TEXT PRIMARY KEY,
        event_type   TEXT NOT NULL,
        status       TEXT NOT NULL CHECK (status IN ('processed', 'rejected', 'ignored')),
        event_count  INTEGER NOT NULL DEFAULT 0,
        unresolved   INTEGER NOT NULL DEFAULT 0,
        detail       TEXT,
        received_at  TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_deliveries_received_at ON deliveries (received_at);

    CREATE TABLE IF NOT EXISTS dispatches (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        delivery_id  TEXT NOT NULL REFERENCES deliveries (id) ON DELETE CASCADE,
        request_id   TEXT,
        job_name     TEXT NOT NULL,
        event_kind   TEXT NOT NULL,
        repository   TEXT NOT NULL,
        status       TEXT NOT NULL,
        error        TEXT,
        created_at   TEXT NOT NULL,
        updated_at   TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_dispatches_delivery ON dispatches (delivery_id);
    CREATE INDEX IF NOT EXISTS idx_dispatches_request ON dispatches (request_id);
    "#,
)];

/// Apply every migration newer than the database's `user_version`.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    debug!(current, "current schema version");

    for &(version, description, sql) in MIGRATIONS {
        if version <= current {
            continue;
        }
        info!(version, description, "applying migration");
        conn.execute_batch(sql)
            .map_err(|e| DatabaseError::MigrationFailed {
                version,
                detail: e.to_string(),
            })?;
        conn.execute_batch(&format!("PRAGMA user_version = {};", version))?;
    }

    Ok(())
}
