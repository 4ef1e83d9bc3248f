//! Hookbridge core library.
//!
//! Turns GitHub webhook notifications into build requests: payload
//! interpretation, repository identity resolution, job matching, trigger
//! dispatch, configuration, and the delivery audit log.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod errors;
pub mod git;
pub mod jobs;
pub mod matcher;
pub mod processor;
pub mod security;
pub mod webhook;

// Re-exports for convenience.
pub use config::AppConfig;
pub use db::Database;
pub use git::RepositoryIdentity;
pub use jobs::JobRegistry;
pub use processor::WebhookProcessor;
