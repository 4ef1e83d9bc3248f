//! hookbridge command-line management tool.
//!
//! Provides subcommands for generating and validating configuration files,
//! listing the configured jobs, dry-running a webhook payload against them,
//! and viewing the delivery audit log.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use tracing_subscriber::EnvFilter;

use hookbridge_core::config::AppConfig;
use hookbridge_core::db::Database;
use hookbridge_core::jobs::{Job, JobRegistry, JobSource};
use hookbridge_core::matcher::match_jobs;
use hookbridge_core::security::{Principal, SecurityContext};
use hookbridge_core::webhook::{self, extract_payload, Interpretation};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// hookbridge command-line management tool.
#[derive(Parser, Debug)]
#[command(
    name = "hookbridge",
    version,
    about = "Manage and inspect a hookbridge webhook bridge"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(
        short,
        long,
        global = true,
        default_value = "/etc/hookbridge/config.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./hookbridge.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,

    /// List configured jobs and the repositories they watch.
    Jobs,

    /// Show which jobs a webhook payload would trigger, without scheduling
    /// anything.
    Match {
        /// File holding the payload (raw JSON or `payload=` form body).
        #[arg(short, long)]
        payload: PathBuf,
    },

    /// Show recent webhook deliveries.
    Deliveries {
        /// Maximum number of entries to show.
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    // Minimal logging for CLI
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("warn"))
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => cmd_validate(&cli.config),
        Commands::Jobs => cmd_jobs(&load_config(&cli.config)?),
        Commands::Match { payload } => cmd_match(&load_config(&cli.config)?, &payload),
        Commands::Deliveries { limit } => {
            let config = load_config(&cli.config)?;
            cmd_deliveries(&open_database(&config)?, limit)
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load_and_resolve(path).context("failed to load configuration file")
}

fn open_database(config: &AppConfig) -> Result<Database> {
    Database::open(&config.daemon).context("failed to open database")
}

const DEFAULT_CONFIG: &str = r#"# hookbridge configuration
# See documentation for all available options.

[daemon]
log_level = "info"
data_dir = "/var/lib/hookbridge"

[web]
listen = "127.0.0.1:8080"
max_body_bytes = 2097152

[queue]
capacity = 256
trigger_timeout_secs = 30

[[jobs]]
name = "example-ci"
# visible_to = ["alice"]
# build_url = "https://ci.example.com/job/example-ci/build"
# build_token_env = "EXAMPLE_CI_TOKEN"

[jobs.trigger]
repositories = ["https://github.com/owner/repo"]
"#;

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, DEFAULT_CONFIG).context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the [[jobs]] entries and the repositories they watch");
    println!("  2. Set the referenced environment variables (build_token_env)");
    println!(
        "  3. Validate with: hookbridge validate --config {}",
        output.display()
    );
    println!(
        "  4. Start the daemon: hookbridge-daemon --config {}",
        output.display()
    );
    println!("  5. Point the GitHub webhook at http://<host>/github-webhook");

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    // Missing env vars only warn
    let _ = config.resolve_env_vars();
    println!("  [OK] Environment variable references processed");

    match config.validate() {
        Ok(()) => {
            println!("  [OK] All required fields are valid");
        }
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    let untriggered = config.jobs.iter().filter(|j| j.trigger.is_none()).count();
    let missing_tokens = config
        .jobs
        .iter()
        .filter(|j| j.build_token_env.is_some() && j.build_token.is_none())
        .count();

    // Summary
    println!();
    println!("Configuration summary:");
    println!("  Web listen     : {}", config.web.listen);
    println!("  Max body       : {} bytes", config.web.max_body_bytes);
    println!("  Queue capacity : {}", config.queue.capacity);
    println!("  Trigger timeout: {}s", config.queue.trigger_timeout_secs);
    println!("  Data directory : {}", config.daemon.data_dir.display());
    println!("  Jobs           : {}", config.jobs.len());
    if untriggered > 0 {
        println!("  Jobs without trigger (never built by webhooks): {}", untriggered);
    }
    if missing_tokens > 0 {
        println!("  Jobs with unresolved build token: {}", missing_tokens);
    }
    println!();
    println!("Configuration is valid.");

    Ok(())
}

fn cmd_jobs(config: &AppConfig) -> Result<()> {
    let jobs = all_jobs(config);
    if jobs.is_empty() {
        println!("No jobs configured.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Job", "Repositories", "Build URL", "Visible to"]);

    for job in &jobs {
        let repos = job
            .trigger()
            .map(|t| {
                t.configured_repositories()
                    .iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_else(|| "(no trigger)".to_string());
        let visible = if job.visible_to.is_empty() {
            "everyone".to_string()
        } else {
            job.visible_to.join(", ")
        };

        table.add_row(vec![
            Cell::new(&job.name),
            Cell::new(repos),
            Cell::new(job.build_url.as_deref().unwrap_or("-")),
            Cell::new(visible),
        ]);
    }

    println!("{table}");
    println!("{} job(s)", jobs.len());
    Ok(())
}

fn cmd_match(config: &AppConfig, payload_path: &Path) -> Result<()> {
    let body = std::fs::read(payload_path)
        .with_context(|| format!("failed to read {}", payload_path.display()))?;
    let payload = extract_payload(None, &body).context("failed to extract payload")?;
    let interpretation =
        webhook::interpret(payload.as_bytes()).context("failed to interpret payload")?;

    let jobs = all_jobs(config);
    let rows = match_rows(&interpretation, &jobs);

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Event", "Repository", "Ref", "Matched jobs"]);
    for row in &rows {
        table.add_row(vec![
            Cell::new(&row.kind),
            Cell::new(&row.repository),
            Cell::new(row.git_ref.as_deref().unwrap_or("-")),
            Cell::new(if row.jobs.is_empty() {
                "(none)".to_string()
            } else {
                row.jobs.join(", ")
            }),
        ]);
    }
    println!("{table}");

    for unresolved in &interpretation.unresolved {
        println!("  [SKIP] {}", unresolved);
    }
    println!(
        "{} event(s), {} job trigger(s); nothing was scheduled",
        rows.len(),
        rows.iter().map(|r| r.jobs.len()).sum::<usize>()
    );
    Ok(())
}

fn cmd_deliveries(db: &Database, limit: u32) -> Result<()> {
    let entries = db
        .list_deliveries(limit)
        .context("failed to list deliveries")?;

    if entries.is_empty() {
        println!("No deliveries recorded.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Received", "Event", "Status", "Events", "Dispatches", "Detail"]);

    for entry in &entries {
        let dispatches = db
            .list_dispatches(&entry.id)
            .context("failed to list dispatches")?
            .iter()
            .map(|d| format!("{} ({})", d.job_name, d.status))
            .collect::<Vec<_>>()
            .join("\n");

        table.add_row(vec![
            Cell::new(&entry.received_at),
            Cell::new(&entry.event_type),
            Cell::new(&entry.status),
            Cell::new(entry.event_count),
            Cell::new(dispatches),
            Cell::new(truncate(entry.detail.as_deref().unwrap_or(""), 50)),
        ]);
    }

    println!("{table}");
    println!("{} entries shown", entries.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// Utilities
// ---------------------------------------------------------------------------

/// Every configured job, regardless of visibility.
fn all_jobs(config: &AppConfig) -> Vec<Job> {
    let registry = JobRegistry::from_config(&config.jobs);
    let security = SecurityContext::new(Principal::Anonymous);
    let elevated = security.elevate();
    registry.enumerate_jobs(&elevated)
}

struct MatchRow {
    kind: String,
    repository: String,
    git_ref: Option<String>,
    jobs: Vec<String>,
}

fn match_rows(interpretation: &Interpretation, jobs: &[Job]) -> Vec<MatchRow> {
    interpretation
        .events
        .iter()
        .map(|event| MatchRow {
            kind: event.kind.to_string(),
            repository: event.repository.to_string(),
            git_ref: event.git_ref.clone(),
            jobs: match_jobs(event, jobs)
                .into_iter()
                .map(|j| j.name.clone())
                .collect(),
        })
        .collect()
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
