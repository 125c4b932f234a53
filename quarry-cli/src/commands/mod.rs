//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod job;
mod query;

pub use job::JobCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a query and print its rows
    Query {
        /// SQL text
        sql: String,

        /// Stop after printing this many rows
        #[arg(long)]
        max_rows: Option<usize>,
    },
    /// Job management
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Query { sql, max_rows } => query::run_query(config, &sql, max_rows).await,
        Commands::Job { command } => job::handle_job_command(command, config).await,
    }
}
