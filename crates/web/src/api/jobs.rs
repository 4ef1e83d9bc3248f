//! Job listing API.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use hookbridge_core::security::Principal;

use crate::AppState;

#[derive(Serialize)]
struct JobView {
    name: String,
    repositories: Vec<String>,
    triggers_remote: bool,
}

#[derive(Serialize)]
struct JobListResponse {
    jobs: Vec<JobView>,
    total: usize,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/jobs", get(list_jobs))
}

/// Jobs visible to an unauthenticated caller.
async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<JobListResponse> {
    let jobs: Vec<JobView> = state
        .registry
        .visible_jobs(&Principal::Anonymous)
        .into_iter()
        .map(|job| JobView {
            repositories: job
                .trigger()
                .map(|t| {
                    t.configured_repositories()
                        .iter()
                        .map(|r| r.web_url())
                        .collect()
                })
                .unwrap_or_default(),
            triggers_remote: job.build_url.is_some(),
            name: job.name,
        })
        .collect();

    let total = jobs.len();
    Json(JobListResponse { jobs, total })
}
