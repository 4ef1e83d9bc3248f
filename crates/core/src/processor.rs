//! End-to-end handling of one webhook notification.
//!
//! interpret → for each event: elevate, enumerate jobs, release, match,
//! dispatch. Events are handled independently; nothing one event does can
//! stop another. Accepted build requests are handed to the builder only
//! after the whole notification has been reported.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::dispatch::{BuildScheduler, DispatchOutcome, TriggerDispatcher};
use crate::errors::{MalformedUrlError, PayloadParseError};
use crate::git::RepositoryIdentity;
use crate::jobs::JobSource;
use crate::matcher::match_jobs;
use crate::security::{Principal, SecurityContext};
use crate::webhook::{self, ChangeEvent, ChangeKind};

/// What happened to one change event.
#[derive(Debug, Clone, Serialize)]
pub struct EventReport {
    pub kind: ChangeKind,
    pub repository: RepositoryIdentity,
    pub git_ref: Option<String>,
    pub sha: Option<String>,
    pub matched: Vec<String>,
    pub dispatches: Vec<DispatchRecord>,
}

/// Serializable view of a [`DispatchOutcome`].
#[derive(Debug, Clone, Serialize)]
pub struct DispatchRecord {
    pub job: String,
    pub request_id: Option<Uuid>,
    pub error: Option<String>,
}

impl From<DispatchOutcome> for DispatchRecord {
    fn from(outcome: DispatchOutcome) -> Self {
        match outcome.result {
            Ok(scheduled) => Self {
                job: outcome.job,
                request_id: Some(scheduled.request_id),
                error: None,
            },
            Err(e) => Self {
                job: outcome.job,
                request_id: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// What happened to one notification.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessReport {
    pub events: Vec<EventReport>,
    pub unresolved: Vec<MalformedUrlError>,
}

impl ProcessReport {
    pub fn matched_count(&self) -> usize {
        self.events.iter().map(|e| e.matched.len()).sum()
    }

    pub fn scheduled_count(&self) -> usize {
        self.dispatch_records().filter(|d| d.error.is_none()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.dispatch_records().filter(|d| d.error.is_some()).count()
    }

    /// Ids of every accepted build request, in dispatch order.
    pub fn request_ids(&self) -> Vec<Uuid> {
        self.dispatch_records().filter_map(|d| d.request_id).collect()
    }

    fn dispatch_records(&self) -> impl Iterator<Item = &DispatchRecord> {
        self.events.iter().flat_map(|e| e.dispatches.iter())
    }
}

/// Wires the job source and the scheduler together.
pub struct WebhookProcessor {
    jobs: Arc<dyn JobSource>,
    dispatcher: TriggerDispatcher<dyn BuildScheduler>,
}

impl WebhookProcessor {
    pub fn new(jobs: Arc<dyn JobSource>, scheduler: Arc<dyn BuildScheduler>) -> Self {
        Self {
            jobs,
            dispatcher: TriggerDispatcher::new(scheduler),
        }
    }

    /// Process a raw JSON notification body and release the accepted
    /// builds right away.
    ///
    /// Only a [`PayloadParseError`] is returned as an error; in that case
    /// nothing has been dispatched.
    pub fn process(&self, raw: &[u8]) -> Result<ProcessReport, PayloadParseError> {
        self.process_with(raw, |_| {})
    }

    /// Process a raw JSON notification body, running `before_release` on
    /// the finished report before any accepted build is released to the
    /// scheduler's consumer.
    pub fn process_with<F>(&self, raw: &[u8], before_release: F) -> Result<ProcessReport, PayloadParseError>
    where
        F: FnOnce(&ProcessReport),
    {
        let report = self.dispatch_notification(raw)?;
        before_release(&report);
        self.dispatcher.release(&report.request_ids());
        Ok(report)
    }

    fn dispatch_notification(&self, raw: &[u8]) -> Result<ProcessReport, PayloadParseError> {
        let interpretation = webhook::interpret(raw)?;

        let events = interpretation
            .events
            .iter()
            .map(|event| self.process_event(event))
            .collect();

        let report = ProcessReport {
            events,
            unresolved: interpretation.unresolved,
        };
        info!(
            events = report.events.len(),
            unresolved = report.unresolved.len(),
            matched = report.matched_count(),
            scheduled = report.scheduled_count(),
            failed = report.failed_count(),
            "notification processed"
        );
        Ok(report)
    }

    /// Match and dispatch one change event.
    ///
    /// Accepted requests are not released; a scheduler that stages them
    /// keeps them until [`WebhookProcessor::process_with`] releases them.
    pub fn process_event(&self, event: &ChangeEvent) -> EventReport {
        // The caller is anonymous; enumeration needs to see every job.
        let security = SecurityContext::new(Principal::Anonymous);
        let jobs = {
            let elevated = security.elevate();
            self.jobs.enumerate_jobs(&elevated)
        };
        debug!(jobs = jobs.len(), kind = %event.kind, "enumerated jobs");

        let matched = match_jobs(event, &jobs);
        let outcomes = self.dispatcher.dispatch_all(&matched, event);

        EventReport {
            kind: event.kind,
            repository: event.repository.clone(),
            git_ref: event.git_ref.clone(),
            sha: event.sha.clone(),
            matched: matched.iter().map(|j| j.name.clone()).collect(),
            dispatches: outcomes.into_iter().map(DispatchRecord::from).collect(),
        }
    }
}
