//! End-to-end tests for notification processing.
//!
//! These tests exercise the real `WebhookProcessor` with:
//! - A `JobRegistry` holding configured jobs
//! - The bounded `BuildQueue`, or a scheduler that fails for selected jobs
//! - A real in-memory SQLite audit log
//!
//! No network I/O: builds are only queued, never triggered.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use hookbridge_core::db::queries::dispatch_status;
use hookbridge_core::db::Database;
use hookbridge_core::dispatch::{BuildQueue, BuildScheduler, Scheduled};
use hookbridge_core::errors::{DispatchError, PayloadParseError};
use hookbridge_core::jobs::{Job, JobRegistry, TriggerConfig};
use hookbridge_core::webhook::{ChangeEvent, ChangeKind};
use hookbridge_core::{RepositoryIdentity, WebhookProcessor};

// ===========================================================================
// Helpers
// ===========================================================================

fn job(name: &str, repos: &[&str]) -> Job {
    Job::new(name).with_trigger(TriggerConfig::new(
        repos.iter().map(|r| RepositoryIdentity::parse(r).unwrap()),
    ))
}

fn push_body(url: &str, owner: &str, name: &str) -> Vec<u8> {
    serde_json::json!({
        "ref": "refs/heads/master",
        "after": "0d1a26e67d8f5eaf1f6ba5c57fc3c7d91ac0fd1c",
        "repository": {
            "url": url,
            "name": name,
            "owner": { "name": owner, "email": "kk@kohsuke.org" }
        }
    })
    .to_string()
    .into_bytes()
}

fn pr_body(head_url: &str, base_url: &str) -> Vec<u8> {
    serde_json::json!({
        "action": "opened",
        "number": 4,
        "pull_request": {
            "head": {
                "label": "justinstoller:test_branch",
                "ref": "test_branch",
                "sha": "a805aa72284b4f76e2dd026c11709c9161c343d6",
                "repo": {
                    "url": head_url,
                    "git_url": "git://github.com/justinstoller/puppet-rvm.git",
                    "ssh_url": "git@github.com:justinstoller/puppet-rvm.git"
                }
            },
            "base": {
                "label": "blt04:master",
                "ref": "master",
                "sha": "315e45a86055594ac6b1d477ed284f88e96b3f81",
                "repo": {
                    "url": base_url,
                    "git_url": "git://github.com/blt04/puppet-rvm.git",
                    "ssh_url": "git@github.com:blt04/puppet-rvm.git"
                }
            }
        }
    })
    .to_string()
    .into_bytes()
}

/// Scheduler that records every call and rejects the listed jobs.
#[derive(Default)]
struct FlakyScheduler {
    failing: HashSet<String>,
    calls: Mutex<Vec<(String, ChangeKind)>>,
}

impl FlakyScheduler {
    fn failing(jobs: &[&str]) -> Self {
        Self {
            failing: jobs.iter().map(|j| j.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(String, ChangeKind)> {
        self.calls.lock().unwrap().clone()
    }
}

impl BuildScheduler for FlakyScheduler {
    fn schedule_build(&self, job: &Job, event: &ChangeEvent) -> Result<Scheduled, DispatchError> {
        self.calls
            .lock()
            .unwrap()
            .push((job.name.clone(), event.kind));
        if self.failing.contains(&job.name) {
            return Err(DispatchError::Rejected {
                job: job.name.clone(),
                reason: "disabled".into(),
            });
        }
        Ok(Scheduled {
            request_id: uuid::Uuid::new_v4(),
            job: job.name.clone(),
        })
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[tokio::test]
async fn test_push_queues_builds_for_watching_jobs() {
    let registry = Arc::new(JobRegistry::from_jobs(vec![
        job("foo-ci", &["https://github.com/kohsuke/foo"]),
        job("foo-release", &["https://github.com/kohsuke/foo.git"]),
        job("bar-ci", &["https://github.com/kohsuke/bar"]),
        Job::new("nightly"),
    ]));
    let (queue, mut rx) = BuildQueue::new(16);
    let processor = WebhookProcessor::new(registry, Arc::new(queue));

    let report = processor
        .process(&push_body("https://github.com/kohsuke/foo", "kohsuke", "foo"))
        .unwrap();

    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].kind, ChangeKind::Push);
    assert_eq!(report.matched_count(), 2);
    assert_eq!(report.scheduled_count(), 2);
    assert_eq!(report.failed_count(), 0);

    let mut queued = vec![rx.recv().await.unwrap().job, rx.recv().await.unwrap().job];
    queued.sort();
    assert_eq!(queued, vec!["foo-ci", "foo-release"]);
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_pull_request_from_fork_dispatches_both_sides() {
    let registry = Arc::new(JobRegistry::from_jobs(vec![
        job("fork-ci", &["https://github.com/justinstoller/puppet-rvm"]),
        job("upstream-ci", &["https://github.com/blt04/puppet-rvm"]),
    ]));
    let scheduler = Arc::new(FlakyScheduler::default());
    let processor = WebhookProcessor::new(registry, scheduler.clone());

    let report = processor
        .process(&pr_body(
            "https://api.github.com/repos/justinstoller/puppet-rvm",
            "https://api.github.com/repos/blt04/puppet-rvm",
        ))
        .unwrap();

    assert_eq!(report.events.len(), 2);
    assert_eq!(
        scheduler.calls(),
        vec![
            ("fork-ci".to_string(), ChangeKind::PullRequestHead),
            ("upstream-ci".to_string(), ChangeKind::PullRequestBase),
        ]
    );
}

#[test]
fn test_same_repo_pull_request_triggers_job_twice() {
    let registry = Arc::new(JobRegistry::from_jobs(vec![job(
        "rvm-ci",
        &["https://github.com/blt04/puppet-rvm"],
    )]));
    let scheduler = Arc::new(FlakyScheduler::default());
    let processor = WebhookProcessor::new(registry, scheduler.clone());

    let report = processor
        .process(&pr_body(
            "https://github.com/blt04/puppet-rvm",
            "https://github.com/blt04/puppet-rvm",
        ))
        .unwrap();

    assert_eq!(report.scheduled_count(), 2);
    assert_eq!(scheduler.calls().len(), 2);
}

#[test]
fn test_dispatch_failure_does_not_stop_other_jobs() {
    let registry = Arc::new(JobRegistry::from_jobs(vec![
        job("a", &["https://github.com/kohsuke/foo"]),
        job("b", &["https://github.com/kohsuke/foo"]),
        job("c", &["https://github.com/kohsuke/foo"]),
    ]));
    let scheduler = Arc::new(FlakyScheduler::failing(&["b"]));
    let processor = WebhookProcessor::new(registry, scheduler.clone());

    let report = processor
        .process(&push_body("https://github.com/kohsuke/foo", "kohsuke", "foo"))
        .unwrap();

    assert_eq!(scheduler.calls().len(), 3);
    assert_eq!(report.scheduled_count(), 2);
    assert_eq!(report.failed_count(), 1);
    let failed = report.events[0]
        .dispatches
        .iter()
        .find(|d| d.error.is_some())
        .unwrap();
    assert_eq!(failed.job, "b");
}

#[test]
fn test_malformed_head_url_still_dispatches_base() {
    let registry = Arc::new(JobRegistry::from_jobs(vec![job(
        "upstream-ci",
        &["https://github.com/blt04/puppet-rvm"],
    )]));
    let scheduler = Arc::new(FlakyScheduler::default());
    let processor = WebhookProcessor::new(registry, scheduler.clone());

    let report = processor
        .process(&pr_body(
            "git://github.com/justinstoller/puppet-rvm.git",
            "https://github.com/blt04/puppet-rvm",
        ))
        .unwrap();

    assert_eq!(report.events.len(), 1);
    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(
        scheduler.calls(),
        vec![("upstream-ci".to_string(), ChangeKind::PullRequestBase)]
    );
}

#[test]
fn test_invalid_payload_dispatches_nothing() {
    let registry = Arc::new(JobRegistry::from_jobs(vec![job(
        "a",
        &["https://github.com/kohsuke/foo"],
    )]));
    let scheduler = Arc::new(FlakyScheduler::default());
    let processor = WebhookProcessor::new(registry, scheduler.clone());

    let err = processor.process(b"{\"repository\": ").unwrap_err();
    assert!(matches!(err, PayloadParseError::InvalidJson(_)));

    let err = processor
        .process(br#"{"repository": {"url": "https://github.com/kohsuke/foo"}}"#)
        .unwrap_err();
    assert!(matches!(err, PayloadParseError::InvalidShape { .. }));

    assert!(scheduler.calls().is_empty());
}

#[test]
fn test_job_added_between_notifications_is_seen() {
    let registry = Arc::new(JobRegistry::new());
    let scheduler = Arc::new(FlakyScheduler::default());
    let processor = WebhookProcessor::new(registry.clone(), scheduler.clone());
    let body = push_body("https://github.com/kohsuke/foo", "kohsuke", "foo");

    assert_eq!(processor.process(&body).unwrap().matched_count(), 0);

    registry.upsert(job("late", &["https://github.com/kohsuke/foo"]));
    assert_eq!(processor.process(&body).unwrap().matched_count(), 1);
}

#[test]
fn test_full_queue_is_reported_and_recorded() {
    let registry = Arc::new(JobRegistry::from_jobs(vec![
        job("a", &["https://github.com/kohsuke/foo"]),
        job("b", &["https://github.com/kohsuke/foo"]),
    ]));
    let (queue, _rx) = BuildQueue::new(1);
    let processor = WebhookProcessor::new(registry, Arc::new(queue));

    let report = processor
        .process(&push_body("https://github.com/kohsuke/foo", "kohsuke", "foo"))
        .unwrap();
    assert_eq!(report.scheduled_count(), 1);
    assert_eq!(report.failed_count(), 1);

    let db = Database::in_memory().unwrap();
    let delivery_id = db.record_report("push", &report).unwrap();

    let statuses: Vec<String> = db
        .list_dispatches(&delivery_id)
        .unwrap()
        .into_iter()
        .map(|d| d.status)
        .collect();
    assert_eq!(
        statuses,
        vec![dispatch_status::QUEUED, dispatch_status::REJECTED]
    );
}
