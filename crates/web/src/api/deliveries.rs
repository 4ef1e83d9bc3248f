//! Delivery audit log API.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use hookbridge_core::db::queries::{DeliveryEntry, DispatchEntry};

use crate::api::status::AppError;
use crate::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct DeliveryQuery {
    pub limit: Option<u32>,
}

#[derive(Serialize)]
struct DispatchView {
    job: String,
    event_kind: String,
    repository: String,
    status: String,
    request_id: Option<String>,
    error: Option<String>,
    updated_at: String,
}

impl From<DispatchEntry> for DispatchView {
    fn from(e: DispatchEntry) -> Self {
        Self {
            job: e.job_name,
            event_kind: e.event_kind,
            repository: e.repository,
            status: e.status,
            request_id: e.request_id,
            error: e.error,
            updated_at: e.updated_at,
        }
    }
}

#[derive(Serialize)]
struct DeliveryView {
    id: String,
    received_at: String,
    event_type: String,
    status: String,
    events: i64,
    unresolved: i64,
    detail: Option<String>,
    dispatches: Vec<DispatchView>,
}

#[derive(Serialize)]
struct DeliveryListResponse {
    deliveries: Vec<DeliveryView>,
    total: usize,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/deliveries", get(list_deliveries))
}

async fn list_deliveries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DeliveryQuery>,
) -> Result<Json<DeliveryListResponse>, AppError> {
    let limit = query.limit.unwrap_or(50).min(500);

    let entries = state
        .db
        .list_deliveries(limit)
        .map_err(|e| AppError::Internal(format!("database error: {}", e)))?;

    let mut deliveries = Vec::with_capacity(entries.len());
    for entry in entries {
        let dispatches = state
            .db
            .list_dispatches(&entry.id)
            .map_err(|e| AppError::Internal(format!("database error: {}", e)))?;
        deliveries.push(delivery_view(entry, dispatches));
    }

    let total = deliveries.len();
    Ok(Json(DeliveryListResponse { deliveries, total }))
}

fn delivery_view(entry: DeliveryEntry, dispatches: Vec<DispatchEntry>) -> DeliveryView {
    DeliveryView {
        id: entry.id,
        received_at: entry.received_at,
        event_type: entry.event_type,
        status: entry.status,
        events: entry.event_count,
        unresolved: entry.unresolved,
        detail: entry.detail,
        dispatches: dispatches.into_iter().map(DispatchView::from).collect(),
    }
}
