//! Repository reference URL parsing.
//!
//! Turns the URLs found in webhook payloads and job trigger configuration
//! into a [`RepositoryIdentity`].
//!
//! Recognized forms:
//! - `http(s)://<host>/<owner>/<name>[/...]` (web form; trailing segments,
//!   a query string and a `.git` suffix on the name are ignored)
//! - `https://api.<host>/repos/<owner>/<name>` (REST API form, GitHub.com)
//! - `https://<host>/api/v3/repos/<owner>/<name>` (REST API form, Enterprise)
//!
//! `git://` and SCP-style `git@host:owner/name.git` references are **not**
//! recognized and fail with [`MalformedUrlError`].

use std::sync::OnceLock;

use regex_lite::Regex;

use crate::errors::MalformedUrlError;

use super::RepositoryIdentity;

/// Scheme and host, followed by the raw path (query and fragment excluded).
fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^https?://([^/?#]+)((?:/[^/?#]*)*)").expect("repository url pattern is valid")
    })
}

/// Parse a repository reference URL into a [`RepositoryIdentity`].
pub fn parse_repository_url(url: &str) -> Result<RepositoryIdentity, MalformedUrlError> {
    let url = url.trim();

    let caps = url_pattern().captures(url).ok_or_else(|| {
        MalformedUrlError::new(url, "only http:// and https:// repository urls are recognized")
    })?;

    let host = &caps[1];
    let segments: Vec<&str> = caps[2].split('/').skip(1).collect();

    let (host, rest) = split_api_form(host, &segments);

    let owner = rest.first().copied().unwrap_or_default();
    let raw_name = rest.get(1).copied().unwrap_or_default();
    let name = raw_name.strip_suffix(".git").unwrap_or(raw_name);

    if owner.is_empty() {
        return Err(MalformedUrlError::new(url, "missing repository owner"));
    }
    if name.is_empty() {
        return Err(MalformedUrlError::new(url, "missing repository name"));
    }

    Ok(RepositoryIdentity::new(host, owner, name))
}

/// Map REST API URLs back to the web host they belong to.
///
/// - `api.github.com` + `/repos/...`      → `github.com`
/// - `<host>` + `/api/v3/repos/...`       → `<host>`
///
/// Anything else is returned unchanged.
fn split_api_form<'a>(host: &'a str, segments: &'a [&'a str]) -> (&'a str, &'a [&'a str]) {
    if let Some(web_host) = host.strip_prefix("api.") {
        if segments.first() == Some(&"repos") && !web_host.is_empty() {
            return (web_host, &segments[1..]);
        }
    }

    if segments.len() >= 3 && segments[..3] == ["api", "v3", "repos"] {
        return (host, &segments[3..]);
    }

    (host, segments)
}
