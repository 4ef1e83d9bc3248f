//! Canonical repository identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::MalformedUrlError;

use super::remote_url;

/// A hosted repository, identified by `(host, owner, name)`.
///
/// Equality is exact and case-sensitive on all three fields. Two identities
/// produced from different URL spellings of the same repository (with or
/// without `.git`, web or API form) compare equal because the parser
/// normalizes before field extraction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepositoryIdentity {
    host: String,
    owner: String,
    name: String,
}

impl RepositoryIdentity {
    pub fn new(host: impl Into<String>, owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse a repository reference URL.
    ///
    /// See [`remote_url::parse_repository_url`] for the recognized forms.
    pub fn parse(url: &str) -> Result<Self, MalformedUrlError> {
        remote_url::parse_repository_url(url)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `owner/name`, the form the hosting service calls "full name".
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Browser URL of the repository.
    pub fn web_url(&self) -> String {
        format!("https://{}/{}/{}", self.host, self.owner, self.name)
    }
}

impl fmt::Display for RepositoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.host, self.owner, self.name)
    }
}

impl FromStr for RepositoryIdentity {
    type Err = MalformedUrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
