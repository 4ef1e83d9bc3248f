//! Build jobs as seen by the webhook bridge.
//!
//! Jobs are owned elsewhere (here: the [`JobRegistry`] fed from the
//! configuration file). The bridge only reads their trigger configuration
//! and asks a [`crate::dispatch::BuildScheduler`] to schedule them.

pub mod registry;

use std::collections::BTreeSet;

use serde::Serialize;

use crate::git::RepositoryIdentity;
use crate::security::ElevatedContext;

pub use registry::JobRegistry;

/// Which repositories cause a job to build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TriggerConfig {
    repositories: BTreeSet<RepositoryIdentity>,
}

impl TriggerConfig {
    pub fn new(repositories: impl IntoIterator<Item = RepositoryIdentity>) -> Self {
        Self {
            repositories: repositories.into_iter().collect(),
        }
    }

    pub fn configured_repositories(&self) -> &BTreeSet<RepositoryIdentity> {
        &self.repositories
    }

    pub fn watches(&self, repository: &RepositoryIdentity) -> bool {
        self.repositories.contains(repository)
    }
}

/// A build job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub name: String,
    pub trigger: Option<TriggerConfig>,
    /// Principal names allowed to see this job; empty means public.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub visible_to: Vec<String>,
    /// Endpoint the build worker notifies when a build is scheduled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_url: Option<String>,
    /// Resolved bearer token for `build_url`.
    #[serde(skip)]
    pub build_token: Option<String>,
}

impl Job {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trigger: None,
            visible_to: Vec::new(),
            build_url: None,
            build_token: None,
        }
    }

    pub fn with_trigger(mut self, trigger: TriggerConfig) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn trigger(&self) -> Option<&TriggerConfig> {
        self.trigger.as_ref()
    }
}

/// Source of the full job list.
///
/// Implementations return a snapshot: a later call may see jobs added or
/// removed in between.
pub trait JobSource: Send + Sync {
    fn enumerate_jobs(&self, ctx: &ElevatedContext<'_>) -> Vec<Job>;
}
