//! Change events extracted from a notification.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::git::RepositoryIdentity;

/// Which repository reference of a notification an event stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Push,
    PullRequestHead,
    PullRequestBase,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::PullRequestHead => "pull_request_head",
            Self::PullRequestBase => "pull_request_base",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resolved repository reference from a notification.
///
/// Only `repository` takes part in job matching; the remaining fields are
/// carried so that the scheduled build knows which ref changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub repository: RepositoryIdentity,
    /// `refs/heads/master` for pushes, the branch name for pull requests.
    pub git_ref: Option<String>,
    /// `owner:branch` label of a pull-request side.
    pub label: Option<String>,
    /// Head commit after a push, or the tip of a pull-request side.
    pub sha: Option<String>,
    /// URL the identity was resolved from.
    pub source_url: String,
    /// Other spellings of the same repository (git:// and SSH clone URLs).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternate_urls: Vec<String>,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, repository: RepositoryIdentity, source_url: impl Into<String>) -> Self {
        Self {
            kind,
            repository,
            git_ref: None,
            label: None,
            sha: None,
            source_url: source_url.into(),
            alternate_urls: Vec::new(),
        }
    }
}
