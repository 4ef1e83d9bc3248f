//! Build dispatch: asking the scheduler to build matched jobs.

pub mod queue;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::DispatchError;
use crate::jobs::Job;
use crate::webhook::ChangeEvent;

pub use queue::{BuildQueue, BuildRequest};

/// Acknowledgement that a build request was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scheduled {
    pub request_id: Uuid,
    pub job: String,
}

/// Accepts build requests. Only acceptance is reported; the build itself
/// runs later, elsewhere.
pub trait BuildScheduler: Send + Sync {
    fn schedule_build(&self, job: &Job, event: &ChangeEvent) -> Result<Scheduled, DispatchError>;

    /// Hand accepted requests over to whatever runs the builds.
    ///
    /// A scheduler may hold accepted requests back until they are
    /// released. Unknown ids are ignored.
    fn release(&self, _request_ids: &[Uuid]) {}
}

/// Outcome of dispatching one (job, event) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub job: String,
    pub result: Result<Scheduled, DispatchError>,
}

impl DispatchOutcome {
    pub fn is_scheduled(&self) -> bool {
        self.result.is_ok()
    }
}

/// Schedules matched jobs, one request per (job, event) pair.
pub struct TriggerDispatcher<S: ?Sized> {
    scheduler: Arc<S>,
}

impl<S: BuildScheduler + ?Sized> TriggerDispatcher<S> {
    pub fn new(scheduler: Arc<S>) -> Self {
        Self { scheduler }
    }

    /// Schedule a single job for the event.
    pub fn dispatch(&self, job: &Job, event: &ChangeEvent) -> Result<Scheduled, DispatchError> {
        let scheduled = self.scheduler.schedule_build(job, event)?;
        info!(
            job = %job.name,
            kind = %event.kind,
            repository = %event.repository,
            request_id = %scheduled.request_id,
            "build scheduled"
        );
        Ok(scheduled)
    }

    /// Schedule every job in `jobs`.
    ///
    /// A failure is logged and recorded in the returned outcome; the
    /// remaining jobs are still dispatched. A panicking scheduler counts as
    /// a failure for that job only. Repeated jobs are scheduled repeatedly.
    pub fn dispatch_all(&self, jobs: &[&Job], event: &ChangeEvent) -> Vec<DispatchOutcome> {
        jobs.iter()
            .map(|job| {
                let result = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(job, event)))
                    .unwrap_or_else(|_| {
                        Err(DispatchError::SchedulerPanicked {
                            job: job.name.clone(),
                        })
                    });
                if let Err(ref e) = result {
                    warn!(
                        job = %job.name,
                        kind = %event.kind,
                        repository = %event.repository,
                        error = %e,
                        "failed to schedule build"
                    );
                }
                DispatchOutcome {
                    job: job.name.clone(),
                    result,
                }
            })
            .collect()
    }

    /// Release previously accepted requests to the scheduler's consumer.
    pub fn release(&self, request_ids: &[Uuid]) {
        if !request_ids.is_empty() {
            self.scheduler.release(request_ids);
        }
    }
}
