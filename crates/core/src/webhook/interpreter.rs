//! Turns a raw notification body into change events.

use tracing::{debug, info, warn};

use crate::errors::{MalformedUrlError, PayloadParseError};
use crate::git::RepositoryIdentity;

use super::events::{ChangeEvent, ChangeKind};
use super::payload::{Notification, PullRequestSide, PushNotification};

/// Result of interpreting one notification.
#[derive(Debug, Clone, Default)]
pub struct Interpretation {
    /// Events whose repository identity resolved.
    pub events: Vec<ChangeEvent>,
    /// Repository references that could not be resolved. Their events are
    /// dropped; the others still proceed.
    pub unresolved: Vec<MalformedUrlError>,
}

/// Interpret a raw JSON notification body.
///
/// A push yields one event and a pull request yields two (head, then base),
/// minus any whose URL fails to resolve.
pub fn interpret(raw: &[u8]) -> Result<Interpretation, PayloadParseError> {
    let notification = Notification::decode(raw)?;
    Ok(interpret_notification(&notification))
}

/// Resolve the repository references of an already decoded notification.
pub fn interpret_notification(notification: &Notification) -> Interpretation {
    let candidates = match notification {
        Notification::Push(push) => vec![push_event(push)],
        Notification::PullRequest(pr) => {
            info!(
                action = pr.action.as_deref().unwrap_or("unknown"),
                number = pr.number,
                head = %pr.head.label,
                base = %pr.base.label,
                "received pull request notification"
            );
            vec![
                side_event(ChangeKind::PullRequestHead, &pr.head),
                side_event(ChangeKind::PullRequestBase, &pr.base),
            ]
        }
    };

    let mut interpretation = Interpretation::default();
    for candidate in candidates {
        match candidate {
            Ok(event) => interpretation.events.push(event),
            Err(e) => {
                warn!(url = %e.url, reason = %e.reason, "malformed repo url, dropping event");
                interpretation.unresolved.push(e);
            }
        }
    }
    interpretation
}

fn push_event(push: &PushNotification) -> Result<ChangeEvent, MalformedUrlError> {
    info!(url = %push.repository_url, "received push notification");

    let repository = RepositoryIdentity::parse(&push.repository_url)?;
    if repository.owner() != push.owner_name || repository.name() != push.repository_name {
        debug!(
            url_owner = repository.owner(),
            url_name = repository.name(),
            payload_owner = %push.owner_name,
            payload_name = %push.repository_name,
            "payload owner/name differ from repository url, using the url"
        );
    }

    let mut event = ChangeEvent::new(ChangeKind::Push, repository, &push.repository_url);
    event.git_ref = push.git_ref.clone();
    event.sha = push.after.clone();
    Ok(event)
}

fn side_event(kind: ChangeKind, side: &PullRequestSide) -> Result<ChangeEvent, MalformedUrlError> {
    let repository = RepositoryIdentity::parse(&side.url)?;

    let mut event = ChangeEvent::new(kind, repository, &side.url);
    event.git_ref = side.git_ref.clone();
    event.label = Some(side.label.clone());
    event.sha = Some(side.sha.clone());
    event.alternate_urls = vec![side.git_url.clone(), side.ssh_url.clone()];
    Ok(event)
}
