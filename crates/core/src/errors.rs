//! Error types for the hookbridge core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.
//!
//! The propagation policy differs per subsystem: a [`PayloadParseError`] is
//! fatal to the whole notification, a [`MalformedUrlError`] only drops the
//! affected change event, and a [`DispatchError`] only affects one
//! (job, event) pair.

use serde::Serialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Payload(#[from] PayloadParseError),

    #[error(transparent)]
    Url(#[from] MalformedUrlError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

// ---------------------------------------------------------------------------
// Payload errors
// ---------------------------------------------------------------------------

/// The notification body could not be decoded into either recognized shape.
#[derive(Debug, Error)]
pub enum PayloadParseError {
    /// The body is not well-formed JSON.
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// The JSON is well-formed but does not fit the detected shape
    /// (missing required field, wrong type, ...).
    #[error("invalid {shape} payload: {source}")]
    InvalidShape {
        shape: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A required field is present but empty.
    #[error("required field '{0}' is empty")]
    EmptyField(&'static str),

    /// Neither `repository.owner.name` nor `repository.owner.login` is set.
    #[error("push payload has neither repository.owner.name nor repository.owner.login")]
    MissingOwner,

    /// A form-encoded body did not carry a `payload` parameter.
    #[error("form body has no 'payload' parameter")]
    MissingPayloadParameter,

    /// The body is not valid UTF-8.
    #[error("payload is not valid UTF-8")]
    InvalidEncoding,
}

// ---------------------------------------------------------------------------
// Repository URL errors
// ---------------------------------------------------------------------------

/// A repository reference URL does not match a recognized form.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("malformed repository url '{url}': {reason}")]
pub struct MalformedUrlError {
    pub url: String,
    pub reason: String,
}

impl MalformedUrlError {
    pub fn new(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch errors
// ---------------------------------------------------------------------------

/// Scheduling a build for one (job, event) pair failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The build queue has no free capacity.
    #[error("build queue is full, build for job '{job}' was not scheduled")]
    QueueFull { job: String },

    /// The build queue's consumer has shut down.
    #[error("build queue is closed, build for job '{job}' was not scheduled")]
    QueueClosed { job: String },

    /// The scheduler refused the request for a job-specific reason.
    #[error("scheduling rejected for job '{job}': {reason}")]
    Rejected { job: String, reason: String },

    /// The scheduler panicked while handling the request.
    #[error("scheduler panicked while scheduling job '{job}'")]
    SchedulerPanicked { job: String },
}

impl DispatchError {
    /// Name of the job the failed dispatch was for.
    pub fn job(&self) -> &str {
        match self {
            Self::QueueFull { job }
            | Self::QueueClosed { job }
            | Self::Rejected { job, .. }
            | Self::SchedulerPanicked { job } => job,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A required environment variable is not set.
    #[error("required environment variable '{var}' is not set (referenced by config field '{field}')")]
    EnvVarMissing { var: String, field: String },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Database errors
// ---------------------------------------------------------------------------

/// Errors from the SQLite audit log.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying rusqlite error.
    #[error("database error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("database migration failed (version {version}): {detail}")]
    MigrationFailed { version: u32, detail: String },

    /// A record was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Generic I/O error (e.g. file permissions).
    #[error("database I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
