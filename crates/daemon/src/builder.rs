//! Build runner that drains the build queue and triggers the scheduled
//! builds.
//!
//! A job with a `build_url` is triggered by POSTing a JSON description of
//! the change to that URL; a job without one is only logged. The outcome is
//! written back to the dispatch record in the audit log.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use hookbridge_core::db::queries::dispatch_status;
use hookbridge_core::db::Database;
use hookbridge_core::dispatch::BuildRequest;

/// Aggregate statistics across all handled requests.
#[derive(Debug, Default)]
pub struct RunnerStats {
    pub triggered: AtomicU64,
    pub failed: AtomicU64,
    pub logged: AtomicU64,
}

/// Body POSTed to a job's build URL.
#[derive(Debug, Serialize)]
struct TriggerPayload<'a> {
    id: String,
    job: &'a str,
    kind: &'a str,
    repository: String,
    repository_url: String,
    #[serde(rename = "ref")]
    git_ref: Option<&'a str>,
    sha: Option<&'a str>,
    label: Option<&'a str>,
    requested_at: String,
}

impl<'a> TriggerPayload<'a> {
    fn new(request: &'a BuildRequest) -> Self {
        let event = &request.event;
        Self {
            id: request.id.to_string(),
            job: &request.job,
            kind: event.kind.as_str(),
            repository: event.repository.full_name(),
            repository_url: event.repository.web_url(),
            git_ref: event.git_ref.as_deref(),
            sha: event.sha.as_deref(),
            label: event.label.as_deref(),
            requested_at: request.requested_at.to_rfc3339(),
        }
    }
}

/// The build runner.
///
/// Runs until every sender of the build queue is dropped, handling the
/// remaining requests before it returns.
pub struct BuildRunner {
    client: reqwest::Client,
    db: Arc<Database>,
    requests: mpsc::Receiver<BuildRequest>,
    stats: Arc<RunnerStats>,
}

impl BuildRunner {
    pub fn new(
        db: Arc<Database>,
        requests: mpsc::Receiver<BuildRequest>,
        trigger_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(trigger_timeout)
            .user_agent(concat!("hookbridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            db,
            requests,
            stats: Arc::new(RunnerStats::default()),
        })
    }

    pub fn stats(&self) -> Arc<RunnerStats> {
        self.stats.clone()
    }

    /// Main runner loop.
    pub async fn run(&mut self) {
        info!("build runner started");

        while let Some(request) = self.requests.recv().await {
            self.handle(&request).await;
        }

        info!(
            triggered = self.stats.triggered.load(Ordering::SeqCst),
            failed = self.stats.failed.load(Ordering::SeqCst),
            logged = self.stats.logged.load(Ordering::SeqCst),
            "build queue closed, build runner stopped"
        );
    }

    async fn handle(&self, request: &BuildRequest) {
        let (status, error) = match request.build_url.as_deref() {
            None => {
                info!(
                    request_id = %request.id,
                    job = %request.job,
                    repository = %request.event.repository,
                    kind = %request.event.kind,
                    "build scheduled (no build url configured)"
                );
                self.stats.logged.fetch_add(1, Ordering::SeqCst);
                (dispatch_status::LOGGED, None)
            }
            Some(url) => match self.trigger(url, request).await {
                Ok(()) => {
                    info!(request_id = %request.id, job = %request.job, "build triggered");
                    self.stats.triggered.fetch_add(1, Ordering::SeqCst);
                    (dispatch_status::TRIGGERED, None)
                }
                Err(e) => {
                    error!(request_id = %request.id, job = %request.job, error = %e, "build trigger failed");
                    self.stats.failed.fetch_add(1, Ordering::SeqCst);
                    (dispatch_status::TRIGGER_FAILED, Some(format!("{:#}", e)))
                }
            },
        };

        if let Err(e) = self
            .db
            .update_dispatch_status(&request.id, status, error.as_deref())
        {
            warn!(request_id = %request.id, error = %e, "failed to record build outcome");
        }
    }

    async fn trigger(&self, url: &str, request: &BuildRequest) -> Result<()> {
        debug!(url, job = %request.job, "posting build trigger");

        let mut req = self.client.post(url).json(&TriggerPayload::new(request));
        if let Some(ref token) = request.build_token {
            req = req.bearer_auth(token);
        }

        let response = req
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("{} responded with {}", url, status);
        }
        Ok(())
    }
}
