//! TOML-based configuration system for hookbridge.
//!
//! All sensitive values (build trigger tokens) are stored as `_env` fields
//! that reference environment variable names. The actual secrets are
//! resolved at runtime via [`AppConfig::resolve_env_vars`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::git::RepositoryIdentity;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Daemon settings.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Webhook server settings.
    #[serde(default)]
    pub web: WebConfig,

    /// Build queue settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Build jobs and their triggers.
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for persistent data (the delivery audit database).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/hookbridge")
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl DaemonConfig {
    /// Path of the SQLite audit database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("hookbridge.db")
    }
}

// ---------------------------------------------------------------------------
// Web
// ---------------------------------------------------------------------------

/// Webhook server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Listen address (default `127.0.0.1:8080`).
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Maximum accepted request body, in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_listen() -> String {
    "127.0.0.1:8080".into()
}
fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Build queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Pending build requests held before new ones are rejected.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Timeout for one build-trigger HTTP call.
    #[serde(default = "default_trigger_timeout")]
    pub trigger_timeout_secs: u64,
}

fn default_capacity() -> usize {
    256
}
fn default_trigger_timeout() -> u64 {
    30
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            trigger_timeout_secs: default_trigger_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// One `[[jobs]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Unique job name.
    pub name: String,

    /// Principal names allowed to see the job (empty = public).
    #[serde(default)]
    pub visible_to: Vec<String>,

    /// URL POSTed to when a build is scheduled.
    #[serde(default)]
    pub build_url: Option<String>,

    /// Environment variable holding a bearer token for `build_url`.
    #[serde(default)]
    pub build_token_env: Option<String>,

    /// Repository trigger; jobs without one are never built by webhooks.
    #[serde(default)]
    pub trigger: Option<TriggerSection>,

    /// Resolved build token.
    #[serde(skip)]
    pub build_token: Option<String>,
}

/// `[jobs.trigger]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerSection {
    /// Repository URLs, e.g. `https://github.com/owner/name`.
    #[serde(default)]
    pub repositories: Vec<String>,
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;

        debug!(jobs = config.jobs.len(), "configuration parsed successfully");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Resolve all `*_env` fields from environment variables and populate the
    /// corresponding resolved fields.
    ///
    /// Fields that reference a missing variable will log a warning but will
    /// **not** fail; the job then triggers without a token.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");

        for job in &mut self.jobs {
            if let Some(ref env_name) = job.build_token_env {
                job.build_token = resolve_optional_env(env_name, "jobs.build_token_env");
            }
        }

        debug!("environment variable resolution complete");
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "queue.capacity".into(),
                detail: "queue capacity must be > 0".into(),
            });
        }
        if self.web.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidValue {
                field: "web.listen".into(),
                detail: format!("'{}' is not a socket address", self.web.listen),
            });
        }

        let mut names = HashSet::new();
        for job in &self.jobs {
            if job.name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "jobs.name".into(),
                    detail: "job name must not be empty".into(),
                });
            }
            if !names.insert(job.name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "jobs.name".into(),
                    detail: format!("duplicate job name '{}'", job.name),
                });
            }
            if let Some(ref trigger) = job.trigger {
                for url in &trigger.repositories {
                    RepositoryIdentity::parse(url).map_err(|e| ConfigError::InvalidValue {
                        field: format!("jobs.{}.trigger.repositories", job.name),
                        detail: e.to_string(),
                    })?;
                }
            }
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
