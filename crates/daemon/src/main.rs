//! hookbridge daemon entry point.
//!
//! Loads configuration, opens the audit log, builds the job registry and the
//! build queue, starts the web server and the build runner, and handles
//! graceful shutdown and job reloads.

mod builder;
mod signals;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hookbridge_core::config::AppConfig;
use hookbridge_core::db::Database;
use hookbridge_core::dispatch::BuildQueue;
use hookbridge_core::jobs::JobRegistry;
use hookbridge_core::processor::WebhookProcessor;
use hookbridge_web::{AppState, WebServer};

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// hookbridge webhook daemon.
#[derive(Parser, Debug)]
#[command(
    name = "hookbridge-daemon",
    version,
    about = "Receives GitHub webhooks and triggers the builds of matching jobs"
)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Override the log level from the config file (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load and resolve configuration
    let mut config =
        AppConfig::load_from_file(&args.config).context("failed to load configuration file")?;
    config
        .resolve_env_vars()
        .context("failed to resolve environment variables in config")?;
    config
        .validate()
        .context("configuration validation failed")?;

    // Initialize tracing
    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.daemon.log_level);

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .init();

    // Startup banner
    info!("========================================");
    info!("  hookbridge daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    info!("Config file    : {}", args.config.display());
    info!("Web listen     : {}", config.web.listen);
    info!("Jobs           : {}", config.jobs.len());
    info!("Queue capacity : {}", config.queue.capacity);
    info!("Data dir       : {}", config.daemon.data_dir.display());
    info!("Log level      : {}", log_level);
    info!("========================================");

    // Open the delivery audit log
    let db = Arc::new(Database::open(&config.daemon).context("failed to open database")?);
    info!("Database ready at {}", config.daemon.database_path().display());

    // Job registry and build queue
    let registry = Arc::new(JobRegistry::from_config(&config.jobs));
    let (queue, build_rx) = BuildQueue::new(config.queue.capacity);
    let processor = WebhookProcessor::new(registry.clone(), Arc::new(queue));

    // Start the build runner. It stops once the web server, the only
    // holder of the queue, is gone.
    let mut runner = builder::BuildRunner::new(
        db.clone(),
        build_rx,
        Duration::from_secs(config.queue.trigger_timeout_secs),
    )?;
    let runner_handle = tokio::spawn(async move {
        runner.run().await;
    });

    // Reload jobs on SIGHUP
    let reload_handle = tokio::spawn(signals::reload_on_hangup(
        args.config.clone(),
        registry.clone(),
    ));

    // Start the web server; it stops accepting on the first shutdown signal.
    let web_server = WebServer::new(
        &config.web,
        AppState {
            processor,
            registry,
            db,
        },
    );
    let served = web_server.start(signals::wait_for_shutdown()).await;
    if let Err(ref e) = served {
        error!("Web server error: {:#}", e);
    }

    info!("Stopping...");
    reload_handle.abort();

    // Let the runner finish the builds that are already queued (up to 10s)
    match tokio::time::timeout(Duration::from_secs(10), runner_handle).await {
        Ok(Ok(())) => info!("build runner stopped gracefully"),
        Ok(Err(e)) => warn!("build runner task error: {}", e),
        Err(_) => warn!("build runner did not stop within 10s, forcing shutdown"),
    }

    info!("hookbridge daemon stopped.");
    served
}
