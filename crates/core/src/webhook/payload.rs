//! Typed decoding of the two notification shapes.
//!
//! The body is decoded exactly once into a [`Notification`]: either the whole
//! detected shape validates, or a [`PayloadParseError`] is returned. No
//! partially decoded notification ever reaches the interpreter.

use percent_encoding::percent_decode;
use serde::Deserialize;

use crate::errors::PayloadParseError;

// ---------------------------------------------------------------------------
// Raw payload structures for deserialization
//
// These mirror the hosting service's webhook JSON. Unknown fields are
// ignored; required fields are non-`Option` so serde reports them by name.
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawPushPayload {
    #[serde(rename = "ref")]
    git_ref: Option<String>,
    after: Option<String>,
    repository: RawPushRepository,
}

#[derive(Debug, Deserialize)]
struct RawPushRepository {
    url: String,
    name: String,
    owner: RawOwner,
}

/// Older API versions send `owner.name`, newer ones `owner.login`; some
/// send both.
#[derive(Debug, Deserialize)]
struct RawOwner {
    name: Option<String>,
    login: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPullRequestPayload {
    action: Option<String>,
    number: Option<u64>,
    pull_request: RawPullRequest,
}

#[derive(Debug, Deserialize)]
struct RawPullRequest {
    number: Option<u64>,
    head: RawPullRequestSide,
    base: RawPullRequestSide,
}

#[derive(Debug, Deserialize)]
struct RawPullRequestSide {
    label: String,
    sha: String,
    #[serde(rename = "ref")]
    git_ref: Option<String>,
    repo: RawPullRequestRepo,
}

#[derive(Debug, Deserialize)]
struct RawPullRequestRepo {
    url: String,
    git_url: String,
    ssh_url: String,
}

// ---------------------------------------------------------------------------
// Validated notification types
// ---------------------------------------------------------------------------

/// A decoded notification, one variant per recognized shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Push(PushNotification),
    PullRequest(PullRequestNotification),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushNotification {
    pub repository_url: String,
    pub repository_name: String,
    pub owner_name: String,
    pub git_ref: Option<String>,
    pub after: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestNotification {
    pub action: Option<String>,
    pub number: Option<u64>,
    pub head: PullRequestSide,
    pub base: PullRequestSide,
}

/// One side (head or base) of a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestSide {
    pub url: String,
    pub git_url: String,
    pub ssh_url: String,
    pub label: String,
    pub sha: String,
    pub git_ref: Option<String>,
}

impl Notification {
    /// Decode a raw JSON body.
    ///
    /// A non-null top-level `pull_request` field selects the pull-request
    /// shape; anything else is decoded as a push.
    pub fn decode(raw: &[u8]) -> Result<Self, PayloadParseError> {
        let value: serde_json::Value =
            serde_json::from_slice(raw).map_err(PayloadParseError::InvalidJson)?;

        let is_pull_request = value
            .get("pull_request")
            .is_some_and(|pr| !pr.is_null());

        if is_pull_request {
            let raw: RawPullRequestPayload =
                serde_json::from_value(value).map_err(|source| PayloadParseError::InvalidShape {
                    shape: "pull_request",
                    source,
                })?;
            Ok(Self::PullRequest(PullRequestNotification::validate(raw)?))
        } else {
            let raw: RawPushPayload =
                serde_json::from_value(value).map_err(|source| PayloadParseError::InvalidShape {
                    shape: "push",
                    source,
                })?;
            Ok(Self::Push(PushNotification::validate(raw)?))
        }
    }

    pub fn shape(&self) -> &'static str {
        match self {
            Self::Push(_) => "push",
            Self::PullRequest(_) => "pull_request",
        }
    }
}

impl PushNotification {
    fn validate(raw: RawPushPayload) -> Result<Self, PayloadParseError> {
        let repo = raw.repository;
        require("repository.url", &repo.url)?;
        require("repository.name", &repo.name)?;

        let owner_name = repo
            .owner
            .name
            .filter(|n| !n.is_empty())
            .or(repo.owner.login.filter(|l| !l.is_empty()))
            .ok_or(PayloadParseError::MissingOwner)?;

        Ok(Self {
            repository_url: repo.url,
            repository_name: repo.name,
            owner_name,
            git_ref: raw.git_ref,
            after: raw.after,
        })
    }
}

impl PullRequestNotification {
    fn validate(raw: RawPullRequestPayload) -> Result<Self, PayloadParseError> {
        let pr = raw.pull_request;
        Ok(Self {
            action: raw.action,
            number: raw.number.or(pr.number),
            head: PullRequestSide::validate(pr.head, Side::Head)?,
            base: PullRequestSide::validate(pr.base, Side::Base)?,
        })
    }
}

#[derive(Clone, Copy)]
enum Side {
    Head,
    Base,
}

impl PullRequestSide {
    fn validate(raw: RawPullRequestSide, side: Side) -> Result<Self, PayloadParseError> {
        let names = match side {
            Side::Head => [
                "pull_request.head.repo.url",
                "pull_request.head.repo.git_url",
                "pull_request.head.repo.ssh_url",
                "pull_request.head.label",
                "pull_request.head.sha",
            ],
            Side::Base => [
                "pull_request.base.repo.url",
                "pull_request.base.repo.git_url",
                "pull_request.base.repo.ssh_url",
                "pull_request.base.label",
                "pull_request.base.sha",
            ],
        };
        require(names[0], &raw.repo.url)?;
        require(names[1], &raw.repo.git_url)?;
        require(names[2], &raw.repo.ssh_url)?;
        require(names[3], &raw.label)?;
        require(names[4], &raw.sha)?;

        Ok(Self {
            url: raw.repo.url,
            git_url: raw.repo.git_url,
            ssh_url: raw.repo.ssh_url,
            label: raw.label,
            sha: raw.sha,
            git_ref: raw.git_ref,
        })
    }
}

fn require(field: &'static str, value: &str) -> Result<(), PayloadParseError> {
    if value.trim().is_empty() {
        Err(PayloadParseError::EmptyField(field))
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Request body extraction
// ---------------------------------------------------------------------------

/// Pull the JSON document out of an inbound request body.
///
/// Form-encoded bodies carry it in the `payload` parameter; anything else is
/// taken as raw JSON. A body without a content type that starts with
/// `payload=` is treated as form-encoded.
pub fn extract_payload(content_type: Option<&str>, body: &[u8]) -> Result<String, PayloadParseError> {
    let is_form = match content_type {
        Some(ct) => ct
            .trim()
            .to_ascii_lowercase()
            .starts_with("application/x-www-form-urlencoded"),
        None => body.starts_with(b"payload="),
    };

    let bytes = if is_form {
        form_value(body, b"payload").ok_or(PayloadParseError::MissingPayloadParameter)?
    } else {
        body.to_vec()
    };
    String::from_utf8(bytes).map_err(|_| PayloadParseError::InvalidEncoding)
}

/// Decoded bytes of the first `key` parameter in a form-encoded body.
fn form_value(body: &[u8], key: &[u8]) -> Option<Vec<u8>> {
    body.split(|&b| b == b'&').find_map(|pair| {
        let (name, value) = match pair.iter().position(|&b| b == b'=') {
            Some(eq) => (&pair[..eq], &pair[eq + 1..]),
            None => (pair, &pair[pair.len()..]),
        };
        (decode_form_component(name) == key).then(|| decode_form_component(value))
    })
}

fn decode_form_component(raw: &[u8]) -> Vec<u8> {
    let spaced: Vec<u8> = raw
        .iter()
        .map(|&b| if b == b'+' { b' ' } else { b })
        .collect();
    percent_decode(&spaced).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_push_with_owner_name() {
        let body = br#"{
            "ref": "refs/heads/master",
            "after": "ea50ac0026d6d9c284e04afba1cc95d86dc3d976",
            "repository": {
                "url": "https://github.com/kohsuke/foo",
                "name": "foo",
                "owner": {"email": "kk@kohsuke.org", "name": "kohsuke"}
            }
        }"#;
        let Notification::Push(push) = Notification::decode(body).unwrap() else {
            panic!("expected push");
        };
        assert_eq!(push.owner_name, "kohsuke");
        assert_eq!(push.repository_name, "foo");
        assert_eq!(push.git_ref.as_deref(), Some("refs/heads/master"));
    }

    #[test]
    fn test_decode_push_with_owner_login() {
        let body = br#"{"repository": {
            "url": "https://github.com/octo/app",
            "name": "app",
            "owner": {"login": "octo", "name": null}
        }}"#;
        let Notification::Push(push) = Notification::decode(body).unwrap() else {
            panic!("expected push");
        };
        assert_eq!(push.owner_name, "octo");
    }

    #[test]
    fn test_decode_push_with_both_owner_keys() {
        let body = br#"{"repository": {
            "url": "https://github.com/octo/app",
            "name": "app",
            "owner": {"login": "octo", "name": "octo"}
        }}"#;
        assert!(matches!(Notification::decode(body), Ok(Notification::Push(_))));
    }

    #[test]
    fn test_push_without_owner_rejected() {
        let body = br#"{"repository": {
            "url": "https://github.com/octo/app",
            "name": "app",
            "owner": {"email": "x@y"}
        }}"#;
        assert!(matches!(
            Notification::decode(body),
            Err(PayloadParseError::MissingOwner)
        ));
    }

    #[test]
    fn test_push_missing_url_rejected() {
        let body = br#"{"repository": {"name": "app", "owner": {"name": "octo"}}}"#;
        let err = Notification::decode(body).unwrap_err();
        assert!(matches!(err, PayloadParseError::InvalidShape { shape: "push", .. }));
        assert!(err.to_string().contains("url"));
    }

    #[test]
    fn test_push_empty_url_rejected() {
        let body = br#"{"repository": {"url": "", "name": "app", "owner": {"name": "octo"}}}"#;
        assert!(matches!(
            Notification::decode(body),
            Err(PayloadParseError::EmptyField("repository.url"))
        ));
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(matches!(
            Notification::decode(b"{not json"),
            Err(PayloadParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(matches!(
            Notification::decode(b"[1, 2, 3]"),
            Err(PayloadParseError::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_null_pull_request_decoded_as_push() {
        let body = br#"{"pull_request": null, "repository": {
            "url": "https://github.com/octo/app",
            "name": "app",
            "owner": {"name": "octo"}
        }}"#;
        assert_eq!(Notification::decode(body).unwrap().shape(), "push");
    }

    #[test]
    fn test_pull_request_missing_base_sha_rejected() {
        let body = br#"{"pull_request": {
            "head": {"label": "a:b", "sha": "1", "repo": {"url": "https://github.com/a/r", "git_url": "git://github.com/a/r.git", "ssh_url": "git@github.com:a/r.git"}},
            "base": {"label": "a:master", "repo": {"url": "https://github.com/a/r", "git_url": "git://github.com/a/r.git", "ssh_url": "git@github.com:a/r.git"}}
        }}"#;
        let err = Notification::decode(body).unwrap_err();
        assert!(matches!(
            err,
            PayloadParseError::InvalidShape { shape: "pull_request", .. }
        ));
        assert!(err.to_string().contains("sha"));
    }

    #[test]
    fn test_pull_request_empty_head_label_rejected() {
        let body = br#"{"pull_request": {
            "head": {"label": "", "sha": "1", "repo": {"url": "https://github.com/a/r", "git_url": "g", "ssh_url": "s"}},
            "base": {"label": "a:master", "sha": "2", "repo": {"url": "https://github.com/a/r", "git_url": "g", "ssh_url": "s"}}
        }}"#;
        assert!(matches!(
            Notification::decode(body),
            Err(PayloadParseError::EmptyField("pull_request.head.label"))
        ));
    }

    // -------------------------------------------------------------------
    // extract_payload
    // -------------------------------------------------------------------

    #[test]
    fn test_extract_form_encoded() {
        let body = b"payload=%7B%22a%22%3A1%7D&other=x";
        let json = extract_payload(Some("application/x-www-form-urlencoded"), body).unwrap();
        assert_eq!(json, r#"{"a":1}"#);
    }

    #[test]
    fn test_extract_form_with_charset() {
        let body = b"payload=%7B%7D";
        let json =
            extract_payload(Some("application/x-www-form-urlencoded; charset=utf-8"), body).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn test_extract_form_without_payload_param() {
        assert!(matches!(
            extract_payload(Some("application/x-www-form-urlencoded"), b"foo=bar"),
            Err(PayloadParseError::MissingPayloadParameter)
        ));
    }

    #[test]
    fn test_extract_raw_json() {
        let json = extract_payload(Some("application/json"), br#"{"a":1}"#).unwrap();
        assert_eq!(json, r#"{"a":1}"#);
    }

    #[test]
    fn test_extract_sniffs_form_without_content_type() {
        let json = extract_payload(None, b"payload=%7B%7D").unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn test_extract_rejects_invalid_utf8() {
        assert!(matches!(
            extract_payload(Some("application/json"), &[0xff, 0xfe]),
            Err(PayloadParseError::InvalidEncoding)
        ));
    }

    #[test]
    fn test_extract_form_rejects_invalid_utf8() {
        assert!(matches!(
            extract_payload(
                Some("application/x-www-form-urlencoded"),
                b"payload=%7B%22a%22%3A%22%FF%22%7D"
            ),
            Err(PayloadParseError::InvalidEncoding)
        ));
    }

    #[test]
    fn test_extract_form_decodes_plus_and_encoded_key() {
        let body = b"other=1&pay%6Coad=%7B%22msg%22%3A%22a+b%2Bc%22%7D";
        let json = extract_payload(Some("application/x-www-form-urlencoded"), body).unwrap();
        assert_eq!(json, r#"{"msg":"a b+c"}"#);
    }
}
