//! In-memory, mutable job registry.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use crate::config::JobConfig;
use crate::git::RepositoryIdentity;
use crate::security::{ElevatedContext, Principal};

use super::{Job, JobSource, TriggerConfig};

/// Live job collection.
///
/// Readers get cloned snapshots; writers (config reload, tests) may add,
/// replace or remove jobs at any time.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<Vec<Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_jobs(jobs: Vec<Job>) -> Self {
        Self {
            jobs: RwLock::new(jobs),
        }
    }

    /// Build a registry from the `[[jobs]]` configuration entries.
    pub fn from_config(configs: &[JobConfig]) -> Self {
        let registry = Self::from_jobs(configs.iter().map(Job::from).collect());
        info!(jobs = registry.len(), "job registry loaded");
        registry
    }

    /// Insert a job, replacing any existing job with the same name.
    pub fn upsert(&self, job: Job) {
        let mut jobs = self.write();
        match jobs.iter_mut().find(|j| j.name == job.name) {
            Some(existing) => {
                debug!(job = %job.name, "replacing job");
                *existing = job;
            }
            None => {
                debug!(job = %job.name, "adding job");
                jobs.push(job);
            }
        }
    }

    pub fn remove(&self, name: &str) -> Option<Job> {
        let mut jobs = self.write();
        let idx = jobs.iter().position(|j| j.name == name)?;
        debug!(job = name, "removing job");
        Some(jobs.remove(idx))
    }

    /// Swap the whole job list (config reload).
    pub fn replace_all(&self, new_jobs: Vec<Job>) {
        let mut jobs = self.write();
        info!(previous = jobs.len(), current = new_jobs.len(), "job registry replaced");
        *jobs = new_jobs;
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Jobs the given principal is allowed to see.
    pub fn visible_jobs(&self, principal: &Principal) -> Vec<Job> {
        self.read()
            .iter()
            .filter(|j| principal.can_see(&j.visible_to))
            .cloned()
            .collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Job>> {
        self.jobs.read().unwrap_or_else(|poisoned| {
            warn!("job registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Job>> {
        self.jobs.write().unwrap_or_else(|poisoned| {
            warn!("job registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl JobSource for JobRegistry {
    fn enumerate_jobs(&self, _ctx: &ElevatedContext<'_>) -> Vec<Job> {
        self.read().clone()
    }
}

impl From<&JobConfig> for Job {
    fn from(config: &JobConfig) -> Self {
        let trigger = config.trigger.as_ref().map(|t| {
            TriggerConfig::new(t.repositories.iter().filter_map(|url| {
                match RepositoryIdentity::parse(url) {
                    Ok(id) => Some(id),
                    Err(e) => {
                        warn!(job = %config.name, error = %e, "ignoring trigger repository");
                        None
                    }
                }
            }))
        });

        Self {
            name: config.name.clone(),
            trigger,
            visible_to: config.visible_to.clone(),
            build_url: config.build_url.clone(),
            build_token: config.build_token.clone(),
        }
    }
}
