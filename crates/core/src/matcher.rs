//! Job matching: which jobs care about a change event.

use tracing::{debug, trace};

use crate::jobs::Job;
use crate::webhook::ChangeEvent;

/// Return, in input order, every job whose trigger watches the event's
/// repository.
///
/// Jobs without a trigger are skipped silently. Each event is matched on its
/// own, so a job watching both sides of a pull request is returned once for
/// each side.
pub fn match_jobs<'a>(event: &ChangeEvent, jobs: &'a [Job]) -> Vec<&'a Job> {
    jobs.iter()
        .filter(|job| {
            let Some(trigger) = job.trigger() else {
                trace!(job = %job.name, "no trigger configured");
                return false;
            };
            debug!(job = %job.name, repository = %event.repository, "considering job");
            if trigger.watches(&event.repository) {
                true
            } else {
                debug!(
                    job = %job.name,
                    repository = %event.repository,
                    "skipped job, no matching repository"
                );
                false
            }
        })
        .collect()
}
