//! Typed query helpers for the delivery audit log.

use chrono::Utc;
use rusqlite::params;
use tracing::debug;
use uuid::Uuid;

use super::Database;
use crate::errors::DatabaseError;
use crate::processor::ProcessReport;

// ---------------------------------------------------------------------------
// Domain structs returned by queries
// ---------------------------------------------------------------------------

/// A row from the `deliveries` table.
#[derive(Debug, Clone)]
pub struct DeliveryEntry {
    pub id: String,
    pub event_type: String,
    pub status: String,
    pub event_count: i64,
    pub unresolved: i64,
    pub detail: Option<String>,
    pub received_at: String,
}

/// A row from the `dispatches` table.
#[derive(Debug, Clone)]
pub struct DispatchEntry {
    pub id: i64,
    pub delivery_id: String,
    pub request_id: Option<String>,
    pub job_name: String,
    pub event_kind: String,
    pub repository: String,
    pub status: String,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Dispatch status values.
pub mod dispatch_status {
    pub const QUEUED: &str = "queued";
    pub const REJECTED: &str = "rejected";
    pub const TRIGGERED: &str = "triggered";
    pub const TRIGGER_FAILED: &str = "trigger_failed";
    pub const LOGGED: &str = "logged";
}

// ---------------------------------------------------------------------------
// Query implementations
// ---------------------------------------------------------------------------

impl Database {
    // -- deliveries ---------------------------------------------------------

    /// Record a processed notification and all of its dispatches in one
    /// transaction. Returns the new delivery id.
    pub fn record_report(&self, event_type: &str, report: &ProcessReport) -> Result<String, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let detail = if report.unresolved.is_empty() {
            None
        } else {
            Some(
                report
                    .unresolved
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        };

        self.transaction(|conn| {
            conn.execute(
                "INSERT INTO deliveries (id, event_type, status, event_count, unresolved, detail, received_at)
                 VALUES (?1, ?2, 'processed', ?3, ?4, ?5, ?6)",
                params![
                    id,
                    event_type,
                    report.events.len() as i64,
                    report.unresolved.len() as i64,
                    detail,
                    now
                ],
            )?;

            for event in &report.events {
                for dispatch in &event.dispatches {
                    let status = if dispatch.error.is_none() {
                        dispatch_status::QUEUED
                    } else {
                        dispatch_status::REJECTED
                    };
                    conn.execute(
                        "INSERT INTO dispatches
                            (delivery_id, request_id, job_name, event_kind, repository, status, error, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                        params![
                            id,
                            dispatch.request_id.map(|r| r.to_string()),
                            dispatch.job,
                            event.kind.as_str(),
                            event.repository.to_string(),
                            status,
                            dispatch.error,
                            now
                        ],
                    )?;
                }
            }
            Ok(())
        })?;

        debug!(id = %id, event_type, "recorded delivery");
        Ok(id)
    }

    /// Record a notification that was not processed (parse failure, ping).
    pub fn record_unprocessed_delivery(
        &self,
        event_type: &str,
        status: &str,
        detail: &str,
    ) -> Result<String, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT INTO deliveries (id, event_type, status, detail, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, event_type, status, detail, now],
        )?;
        debug!(id = %id, event_type, status, "recorded unprocessed delivery");
        Ok(id)
    }

    /// Return the most recent N deliveries, newest first.
    pub fn list_deliveries(&self, limit: u32) -> Result<Vec<DeliveryEntry>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, event_type, status, event_count, unresolved, detail, received_at
             FROM deliveries ORDER BY received_at DESC, rowid DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit], |row| {
                Ok(DeliveryEntry {
                    id: row.get(0)?,
                    event_type: row.get(1)?,
                    status: row.get(2)?,
                    event_count: row.get(3)?,
                    unresolved: row.get(4)?,
                    detail: row.get(5)?,
                    received_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // -- dispatches ---------------------------------------------------------

    /// All dispatches recorded for one delivery, in insertion order.
    pub fn list_dispatches(&self, delivery_id: &str) -> Result<Vec<DispatchEntry>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, delivery_id, request_id, job_name, event_kind, repository, status, error, created_at, updated_at
             FROM dispatches WHERE delivery_id = ?1 ORDER BY id",
        )?;
        let entries = stmt
            .query_map(params![delivery_id], |row| {
                Ok(DispatchEntry {
                    id: row.get(0)?,
                    delivery_id: row.get(1)?,
                    request_id: row.get(2)?,
                    job_name: row.get(3)?,
                    event_kind: row.get(4)?,
                    repository: row.get(5)?,
                    status: row.get(6)?,
                    error: row.get(7)?,
                    created_at: row.get(8)?,
                    updated_at: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Update the status of the dispatch created for a build request.
    pub fn update_dispatch_status(
        &self,
        request_id: &Uuid,
        status: &str,
        error: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn().execute(
            "UPDATE dispatches SET status = ?1, error = ?2, updated_at = ?3 WHERE request_id = ?4",
            params![status, error, now, request_id.to_string()],
        )?;
        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "dispatch".into(),
                id: request_id.to_string(),
            });
        }
        debug!(request_id = %request_id, status, "updated dispatch status");
        Ok(())
    }
}
