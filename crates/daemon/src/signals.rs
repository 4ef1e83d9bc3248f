//! Signal handling for the daemon.
//!
//! SIGTERM and SIGINT (Ctrl+C on all platforms) start a graceful shutdown.
//! SIGHUP on Unix reloads the `[[jobs]]` section of the configuration file
//! into the live job registry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use hookbridge_core::config::AppConfig;
use hookbridge_core::jobs::{Job, JobRegistry};

/// Wait for a shutdown signal (SIGTERM, SIGINT, or Ctrl+C).
///
/// This function resolves once any termination signal is received.
pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("received SIGTERM");
        }
    }
}

/// Reload jobs from `config_path` every time SIGHUP is received.
///
/// Runs until the task is aborted.
#[cfg(unix)]
pub async fn reload_on_hangup(config_path: PathBuf, registry: Arc<JobRegistry>) {
    let mut hangup =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
            Ok(signal) => signal,
            Err(e) => {
                warn!(error = %e, "failed to install SIGHUP handler, job reload disabled");
                return;
            }
        };

    while hangup.recv().await.is_some() {
        info!(path = %config_path.display(), "received SIGHUP, reloading jobs");
        reload_jobs(&config_path, &registry);
    }
}

#[cfg(not(unix))]
pub async fn reload_on_hangup(_config_path: PathBuf, _registry: Arc<JobRegistry>) {
    std::future::pending::<()>().await
}

/// Replace the registry's jobs with those in the configuration file.
///
/// An unreadable or invalid file leaves the current jobs in place.
pub fn reload_jobs(config_path: &Path, registry: &JobRegistry) -> bool {
    match AppConfig::load_and_resolve(config_path) {
        Ok(config) => {
            registry.replace_all(config.jobs.iter().map(Job::from).collect());
            true
        }
        Err(e) => {
            warn!(error = %e, "job reload failed, keeping current jobs");
            false
        }
    }
}
