//! Bounded in-process build queue.
//!
//! [`BuildQueue::schedule_build`] never waits: it either reserves a slot in
//! the channel immediately or fails with a [`DispatchError`]. The request is
//! staged against its slot and only reaches the receiving worker (the
//! daemon's build runner) once it is released with
//! [`BuildScheduler::release`].

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::OwnedPermit;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::DispatchError;
use crate::jobs::Job;
use crate::webhook::ChangeEvent;

use super::{BuildScheduler, Scheduled};

/// A build waiting to be triggered.
#[derive(Debug, Clone, Serialize)]
pub struct BuildRequest {
    pub id: Uuid,
    pub job: String,
    pub build_url: Option<String>,
    #[serde(skip)]
    pub build_token: Option<String>,
    pub event: ChangeEvent,
    pub requested_at: DateTime<Utc>,
}

/// An accepted request holding its reserved slot.
struct StagedBuild {
    permit: OwnedPermit<BuildRequest>,
    request: BuildRequest,
}

/// Sending half of the build queue.
///
/// Staged requests count against the capacity.
pub struct BuildQueue {
    tx: mpsc::Sender<BuildRequest>,
    staged: Mutex<HashMap<Uuid, StagedBuild>>,
}

impl BuildQueue {
    /// Create a queue holding at most `capacity` pending requests.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<BuildRequest>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let queue = Self {
            tx,
            staged: Mutex::new(HashMap::new()),
        };
        (queue, rx)
    }

    /// Number of accepted requests not yet released.
    pub fn staged_len(&self) -> usize {
        self.staged().len()
    }

    fn staged(&self) -> MutexGuard<'_, HashMap<Uuid, StagedBuild>> {
        self.staged.lock().unwrap_or_else(|poisoned| {
            warn!("build queue mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl BuildScheduler for BuildQueue {
    fn schedule_build(&self, job: &Job, event: &ChangeEvent) -> Result<Scheduled, DispatchError> {
        let request = BuildRequest {
            id: Uuid::new_v4(),
            job: job.name.clone(),
            build_url: job.build_url.clone(),
            build_token: job.build_token.clone(),
            event: event.clone(),
            requested_at: Utc::now(),
        };
        let request_id = request.id;

        let permit = match self.tx.clone().try_reserve_owned() {
            Ok(permit) => permit,
            Err(TrySendError::Full(_)) => {
                return Err(DispatchError::QueueFull {
                    job: job.name.clone(),
                })
            }
            Err(TrySendError::Closed(_)) => {
                return Err(DispatchError::QueueClosed {
                    job: job.name.clone(),
                })
            }
        };

        self.staged()
            .insert(request_id, StagedBuild { permit, request });
        Ok(Scheduled {
            request_id,
            job: job.name.clone(),
        })
    }

    fn release(&self, request_ids: &[Uuid]) {
        let mut staged = self.staged();
        for id in request_ids {
            if let Some(StagedBuild { permit, request }) = staged.remove(id) {
                debug!(request_id = %id, job = %request.job, "releasing build request");
                permit.send(request);
            }
        }
    }
}
