//! Quarry CLI
//!
//! Command-line interface for running queries and managing jobs on a
//! BigQuery-style job service.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "quarry")]
#[command(about = "Quarry job service CLI", long_about = None)]
struct Cli {
    /// Job service endpoint
    #[arg(long, global = true, env = "QUARRY_ENDPOINT")]
    endpoint: Option<String>,

    /// Project that owns jobs and is billed for queries
    #[arg(long, global = true, env = "QUARRY_PROJECT")]
    project: Option<String>,

    /// OAuth2 bearer token
    #[arg(long, global = true, env = "QUARRY_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Job location (e.g. US, EU)
    #[arg(long, global = true, env = "QUARRY_LOCATION")]
    location: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Maximum time spent waiting for a job, in seconds
    #[arg(long, global = true)]
    max_wait: Option<u64>,

    /// Maximum number of status checks per job
    #[arg(long, global = true)]
    max_polls: Option<u32>,

    /// Emit a span for every job service call
    #[arg(long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quarry=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config {
        endpoint: cli.endpoint,
        project: cli.project,
        access_token: cli.access_token,
        location: cli.location,
        timeout_secs: cli.timeout,
        max_wait_secs: cli.max_wait,
        max_polls: cli.max_polls,
        trace: cli.trace,
    };

    handle_command(cli.command, &config).await
}
